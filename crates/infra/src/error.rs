//! Service-level error taxonomy.
//!
//! Every operation of the core returns one of these as a typed result; nothing
//! is retried here and nothing is reported as partial success.

use thiserror::Error;

use tenantgate_auth::{AuthError, AuthzError, PrincipalId};
use tenantgate_core::DomainError;

use crate::store::{Constraint, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The caller's claims do not cover the target role or tenant.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("slug already taken: {0}")]
    DuplicateSlug(String),

    #[error("a pending invitation already exists for {0}")]
    DuplicateInvitation(String),

    /// Cycle, self-loop, duplicate edge or cross-tenant edge.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("No pending invitation found for this email")]
    NoPendingInvitation,

    #[error("already onboarded: {0}")]
    AlreadyOnboarded(String),

    /// The principal has no profile and therefore no tenant.
    #[error("principal {0} is not a member of any tenant")]
    NotAMember(PrincipalId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Delegated from the credential authority.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<DomainError> for GateError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => GateError::Validation(msg),
            DomainError::InvariantViolation(msg) => GateError::Validation(msg),
            DomainError::InvalidHierarchy(msg) => GateError::InvalidHierarchy(msg),
            DomainError::NotFound(what) => GateError::NotFound(what),
        }
    }
}

impl From<AuthzError> for GateError {
    fn from(value: AuthzError) -> Self {
        GateError::Forbidden(value.to_string())
    }
}

impl From<StoreError> for GateError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UniqueViolation(Constraint::TenantSlug) => {
                GateError::DuplicateSlug("slug already taken".into())
            }
            StoreError::UniqueViolation(Constraint::PendingInvitation) => {
                GateError::DuplicateInvitation("email".into())
            }
            StoreError::UniqueViolation(Constraint::ProfileId | Constraint::ProfileEmail) => {
                GateError::AlreadyOnboarded("profile already exists".into())
            }
            StoreError::UniqueViolation(Constraint::HierarchyEdge) => {
                GateError::InvalidHierarchy("edge already exists".into())
            }
            StoreError::InvalidHierarchy(msg) => GateError::InvalidHierarchy(msg),
            StoreError::TenantIsolation(msg) => GateError::Forbidden(msg),
            StoreError::NotFound(what) => GateError::NotFound(what),
            other => GateError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violations_map_to_taxonomy() {
        assert!(matches!(
            GateError::from(StoreError::UniqueViolation(Constraint::TenantSlug)),
            GateError::DuplicateSlug(_)
        ));
        assert!(matches!(
            GateError::from(StoreError::UniqueViolation(Constraint::PendingInvitation)),
            GateError::DuplicateInvitation(_)
        ));
        assert!(matches!(
            GateError::from(StoreError::UniqueViolation(Constraint::ProfileEmail)),
            GateError::AlreadyOnboarded(_)
        ));
    }

    #[test]
    fn isolation_violations_fail_closed_as_forbidden() {
        assert!(matches!(
            GateError::from(StoreError::TenantIsolation("x".into())),
            GateError::Forbidden(_)
        ));
        assert!(matches!(
            GateError::from(AuthzError::TenantMismatch),
            GateError::Forbidden(_)
        ));
    }
}
