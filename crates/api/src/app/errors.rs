use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tenantgate_auth::AuthError;
use tenantgate_infra::GateError;

pub fn gate_error_to_response(err: GateError) -> axum::response::Response {
    match err {
        GateError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        GateError::DuplicateSlug(slug) => json_error(
            StatusCode::CONFLICT,
            "duplicate_slug",
            format!("slug already taken: {slug}"),
        ),
        GateError::DuplicateInvitation(email) => json_error(
            StatusCode::CONFLICT,
            "duplicate_invitation",
            format!("a pending invitation already exists for {email}"),
        ),
        GateError::AlreadyOnboarded(msg) => json_error(StatusCode::CONFLICT, "already_onboarded", msg),
        GateError::InvalidHierarchy(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_hierarchy", msg)
        }
        GateError::Validation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
        err @ GateError::NoPendingInvitation => {
            json_error(StatusCode::FORBIDDEN, "no_pending_invitation", err.to_string())
        }
        err @ GateError::NotAMember(_) => json_error(StatusCode::FORBIDDEN, "not_a_member", err.to_string()),
        GateError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", what),
        GateError::Auth(e) => auth_error_to_response(e),
        GateError::Store(e) => {
            tracing::error!(error = %e, "relation store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::IdentityExists => json_error(StatusCode::CONFLICT, "identity_exists", err.to_string()),
        AuthError::StaleCredential => {
            json_error(StatusCode::UNAUTHORIZED, "stale_credential", err.to_string())
        }
        AuthError::Signing(_) | AuthError::Hashing(_) => {
            tracing::error!(error = %err, "credential authority failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "credential_error", err.to_string())
        }
        other => json_error(StatusCode::UNAUTHORIZED, "unauthorized", other.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
