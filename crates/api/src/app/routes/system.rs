use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let claims = &principal.principal().claims;
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "principal_id": principal.principal_id().to_string(),
        "role": principal.role_id().to_string(),
        "descendants": claims.descendants.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
    }))
}
