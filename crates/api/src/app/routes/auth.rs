use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router};

use tenantgate_infra::GateError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/token", post(token))
}

/// Create an identity; only invited emails get through the onboarding gate.
pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SignupRequest>,
) -> axum::response::Response {
    let principal = match services
        .credentials
        .create_identity(&body.email, &body.password, body.metadata)
        .await
    {
        Ok(id) => id,
        Err(e) => return errors::gate_error_to_response(e),
    };

    match services.store.profile(principal).await {
        Ok(Some(profile)) => {
            (StatusCode::CREATED, Json(dto::ProfileResponse::from(profile))).into_response()
        }
        Ok(None) => errors::gate_error_to_response(GateError::NotAMember(principal)),
        Err(e) => errors::gate_error_to_response(e.into()),
    }
}

/// Password sign-in; the token embeds claims derived from current state.
pub async fn token(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::TokenRequest>,
) -> axum::response::Response {
    match services.sessions.sign_in(&body.email, &body.password).await {
        Ok(issued) => (StatusCode::OK, Json(dto::TokenResponse::from(issued))).into_response(),
        Err(e) => errors::gate_error_to_response(e),
    }
}
