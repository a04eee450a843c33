use axum::{routing::get, Router};

pub mod auth;
pub mod invitations;
pub mod roles;
pub mod system;
pub mod tenants;

/// Router for all authenticated (tenant-scoped) member endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/roles", roles::router())
        .route("/hierarchy", axum::routing::post(roles::link_edge))
        .nest("/invitations", invitations::router())
}
