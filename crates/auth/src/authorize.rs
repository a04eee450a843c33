use std::collections::BTreeSet;

use thiserror::Error;

use tenantgate_core::{RoleId, TenantId};

use crate::{Actor, Permission, Principal, permissions::first_uncovered};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("operation requires the system operator")]
    OperatorOnly,
}

/// The facts about a tenant that authorization decisions need.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantRoot {
    pub tenant_id: TenantId,
    pub owner_role_id: RoleId,
}

/// Only the system operator may pass.
pub fn require_operator(actor: &Actor) -> Result<(), AuthzError> {
    if actor.is_operator() {
        Ok(())
    } else {
        Err(AuthzError::OperatorOnly)
    }
}

/// Only a tenant member may pass; the operator has no tenant of its own.
pub fn require_member(actor: &Actor) -> Result<&Principal, AuthzError> {
    actor
        .as_member()
        .ok_or_else(|| AuthzError::Forbidden("the operator does not act inside a tenant".into()))
}

/// The principal's claims must name `tenant_id`.
pub fn authorize_tenant(principal: &Principal, tenant_id: TenantId) -> Result<(), AuthzError> {
    if principal.claims.tenant_id == tenant_id {
        Ok(())
    } else {
        Err(AuthzError::TenantMismatch)
    }
}

/// Whether the principal holds the tenant's owner role.
pub fn is_owner(principal: &Principal, root: &TenantRoot) -> bool {
    principal.claims.tenant_id == root.tenant_id && principal.claims.role_id == root.owner_role_id
}

/// Authorize acting on `target` inside `root`'s tenant.
///
/// - No IO
/// - No panics
/// - Fails closed on any tenant mismatch
pub fn authorize_role(
    principal: &Principal,
    root: &TenantRoot,
    target: RoleId,
) -> Result<(), AuthzError> {
    authorize_tenant(principal, root.tenant_id)?;
    if is_owner(principal, root) || principal.claims.acts_on(target) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(format!(
            "role {target} is outside the caller's administrable set"
        )))
    }
}

/// A principal may not hand out permissions its own role lacks.
pub fn authorize_grant(
    held: &BTreeSet<Permission>,
    requested: &BTreeSet<Permission>,
) -> Result<(), AuthzError> {
    match first_uncovered(held, requested) {
        None => Ok(()),
        Some(missing) => Err(AuthzError::Forbidden(format!(
            "cannot grant permission '{missing}' the caller does not hold"
        ))),
    }
}
