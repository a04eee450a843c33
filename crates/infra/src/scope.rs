//! Tenant-scope guard in front of the relation store.
//!
//! Every tenant-scoped write passes through [`ScopedStore`], which re-checks
//! the row's `tenant_id` against the caller's before it reaches storage, and
//! every read is filtered to the caller's tenant.

use tenantgate_auth::Actor;
use tenantgate_core::{RoleId, TenantId};
use tenantgate_tenancy::{HierarchyEdge, Invitation, Role, Tenant};

use crate::store::{EmailScope, RelationStore, StoreError};

/// Row-level predicate derived from the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scope {
    Operator,
    Tenant(TenantId),
}

impl Scope {
    pub fn of(actor: &Actor) -> Self {
        match actor {
            Actor::Operator => Scope::Operator,
            Actor::Member(principal) => Scope::Tenant(principal.tenant_id()),
        }
    }

    pub fn permits(&self, tenant_id: TenantId) -> bool {
        match self {
            Scope::Operator => true,
            Scope::Tenant(own) => *own == tenant_id,
        }
    }

    fn guard(&self, tenant_id: TenantId, what: &str) -> Result<(), StoreError> {
        if self.permits(tenant_id) {
            Ok(())
        } else {
            tracing::warn!(target_tenant = %tenant_id, scope = ?self, what, "blocked cross-tenant write");
            Err(StoreError::TenantIsolation(format!(
                "{what} targets tenant {tenant_id} outside the caller's scope"
            )))
        }
    }
}

pub struct ScopedStore<'a, S: ?Sized> {
    store: &'a S,
    scope: Scope,
}

impl<'a, S> ScopedStore<'a, S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(store: &'a S, scope: Scope) -> Self {
        Self { store, scope }
    }

    pub fn for_actor(store: &'a S, actor: &Actor) -> Self {
        Self::new(store, Scope::of(actor))
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub async fn insert_role(&self, role: &Role, parent: Option<RoleId>) -> Result<u64, StoreError> {
        self.scope.guard(role.tenant_id, "role")?;
        self.store.insert_role(role, parent).await
    }

    pub async fn insert_edge(&self, edge: &HierarchyEdge) -> Result<u64, StoreError> {
        self.scope.guard(edge.tenant_id, "hierarchy edge")?;
        self.store.insert_edge(edge).await
    }

    pub async fn insert_invitation(
        &self,
        invitation: &Invitation,
        email_scope: EmailScope,
    ) -> Result<(), StoreError> {
        self.scope.guard(invitation.tenant_id, "invitation")?;
        self.store.insert_invitation(invitation, email_scope).await
    }

    pub async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        if !self.scope.permits(id) {
            return Ok(None);
        }
        self.store.tenant(id).await
    }

    /// A role outside the scope reads as absent.
    pub async fn role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self
            .store
            .role(id)
            .await?
            .filter(|role| self.scope.permits(role.tenant_id)))
    }

    pub async fn roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        self.scope.guard(tenant_id, "role listing")?;
        self.store.roles(tenant_id).await
    }

    pub async fn invitations(&self, tenant_id: TenantId) -> Result<Vec<Invitation>, StoreError> {
        self.scope.guard(tenant_id, "invitation listing")?;
        self.store.invitations(tenant_id).await
    }
}
