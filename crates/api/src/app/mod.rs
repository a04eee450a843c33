//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the shared [`AppServices`](services::AppServices)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::{get, post}, Extension, Router};
use tower::ServiceBuilder;

use tenantgate_infra::GateConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: GateConfig) -> anyhow::Result<Router> {
    let services = services::build_services(&config).await?;
    Ok(build_app_with(Arc::new(services)))
}

/// Build the router around already-wired services.
pub fn build_app_with(services: Arc<services::AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        services: Arc::clone(&services),
    };

    // Member routes: tenant and principal context come from the bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::auth_middleware,
    ));

    let operator = Router::new()
        .route("/tenants", post(routes::tenants::provision_tenant))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::operator_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/auth", routes::auth::router())
        .merge(operator)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
