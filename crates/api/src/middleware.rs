use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::{OperatorContext, PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<AppServices>,
}

/// Verify a member's bearer token and attach tenant/principal context.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(unauthorized)?;

    let principal = state
        .services
        .verifier
        .verify(token)
        .await
        .map_err(errors::gate_error_to_response)?;

    req.extensions_mut()
        .insert(TenantContext::new(principal.tenant_id()));
    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

/// Accept only the configured operator key.
pub async fn operator_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(unauthorized)?;

    if !state.services.is_operator_key(token) {
        tracing::warn!("rejected operator request with an unknown key");
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "operator credentials required",
        ));
    }

    req.extensions_mut().insert(OperatorContext);
    Ok(next.run(req).await)
}

fn unauthorized(status: StatusCode) -> Response {
    errors::json_error(status, "unauthorized", "missing or malformed bearer token")
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
