use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use tenantgate_infra::InvitationRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_invitations).post(create_invitation))
}

pub async fn create_invitation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<InvitationRequest>,
) -> axum::response::Response {
    match services
        .invitations
        .create_invitation(&principal.actor(), body)
        .await
    {
        Ok(inv) => (StatusCode::CREATED, Json(dto::InvitationResponse::from(inv))).into_response(),
        Err(e) => errors::gate_error_to_response(e),
    }
}

pub async fn list_invitations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.invitations.list_invitations(&principal.actor()).await {
        Ok(items) => {
            let items = items
                .into_iter()
                .map(dto::InvitationResponse::from)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::gate_error_to_response(e),
    }
}
