use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use tenantgate_core::RoleId;
use tenantgate_infra::{GateError, NewRole};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id/descendants", get(descendants))
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.hierarchy.list_roles(&principal.actor()).await {
        Ok(roles) => {
            let items = roles.into_iter().map(dto::RoleResponse::from).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::gate_error_to_response(e),
    }
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewRole>,
) -> axum::response::Response {
    match services.hierarchy.create_role(&principal.actor(), body).await {
        Ok(role) => (StatusCode::CREATED, Json(dto::RoleResponse::from(role))).into_response(),
        Err(e) => errors::gate_error_to_response(e),
    }
}

pub async fn descendants(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let role_id: RoleId = match id.parse() {
        Ok(id) => id,
        Err(e) => return errors::gate_error_to_response(GateError::from(e)),
    };

    match services.hierarchy.descendants_of(&principal.actor(), role_id).await {
        Ok(roles) => {
            let items = roles.into_iter().map(dto::RoleResponse::from).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::gate_error_to_response(e),
    }
}

pub async fn link_edge(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::LinkEdgeRequest>,
) -> axum::response::Response {
    if body
        .tenant_id
        .is_some_and(|supplied| supplied != principal.principal().tenant_id())
    {
        tracing::warn!("ignoring client-supplied tenant_id on hierarchy edge");
    }

    match services
        .hierarchy
        .link_edge(&principal.actor(), body.parent_role_id, body.child_role_id)
        .await
    {
        Ok(edge) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "tenant_id": edge.tenant_id,
                "parent_role_id": edge.parent_role_id,
                "child_role_id": edge.child_role_id,
            })),
        )
            .into_response(),
        Err(e) => errors::gate_error_to_response(e),
    }
}
