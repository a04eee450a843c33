use tenantgate_auth::{Actor, Principal, PrincipalId};
use tenantgate_core::{RoleId, TenantId};

/// Tenant context for a request.
///
/// Derived from the verified token only; never from the request body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated identity + claims).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal.id
    }

    pub fn role_id(&self) -> RoleId {
        self.principal.claims.role_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn actor(&self) -> Actor {
        Actor::Member(self.principal.clone())
    }
}

/// Marker inserted once the operator key has been verified.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OperatorContext;

impl OperatorContext {
    pub fn actor(&self) -> Actor {
        Actor::Operator
    }
}
