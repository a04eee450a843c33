use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use tenantgate_infra::ProvisionRequest;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::OperatorContext;

pub async fn provision_tenant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(operator): Extension<OperatorContext>,
    Json(body): Json<ProvisionRequest>,
) -> axum::response::Response {
    match services
        .provisioner
        .provision_tenant(&operator.actor(), body)
        .await
    {
        Ok(provisioned) => (StatusCode::CREATED, Json(provisioned)).into_response(),
        Err(e) => errors::gate_error_to_response(e),
    }
}
