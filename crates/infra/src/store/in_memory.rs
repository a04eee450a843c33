use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tenantgate_auth::{PrincipalId, RoleGraph};
use tenantgate_core::{InvitationId, RoleId, TenantId};
use tenantgate_tenancy::{Email, HierarchyEdge, Invitation, Profile, Role, Slug, Tenant};

use super::{Constraint, EmailScope, RelationStore, StoreError};

#[derive(Debug)]
struct TenantRow {
    tenant: Tenant,
    hierarchy_version: u64,
}

#[derive(Debug, Default)]
struct Tables {
    tenants: HashMap<TenantId, TenantRow>,
    roles: HashMap<RoleId, Role>,
    edges: HashMap<TenantId, Vec<HierarchyEdge>>,
    invitations: HashMap<InvitationId, Invitation>,
    profiles: HashMap<PrincipalId, Profile>,
}

impl Tables {
    fn graph(&self, tenant_id: TenantId) -> Result<RoleGraph, StoreError> {
        let pairs = self
            .edges
            .get(&tenant_id)
            .into_iter()
            .flatten()
            .map(HierarchyEdge::pair);
        RoleGraph::from_edges(pairs).map_err(|e| StoreError::InvalidHierarchy(e.to_string()))
    }

    fn bump(&mut self, tenant_id: TenantId) -> Result<u64, StoreError> {
        let row = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;
        row.hierarchy_version += 1;
        Ok(row.hierarchy_version)
    }

    fn check_pending_slot(
        &self,
        invitation: &Invitation,
        scope: EmailScope,
    ) -> Result<(), StoreError> {
        if self
            .invitations
            .values()
            .any(|existing| existing.id != invitation.id && scope.collides(existing, invitation))
        {
            return Err(StoreError::UniqueViolation(Constraint::PendingInvitation));
        }
        Ok(())
    }

    /// Role lookup that must also sit inside `tenant_id`.
    fn role_in(&self, tenant_id: TenantId, role_id: RoleId) -> Result<&Role, StoreError> {
        let role = self
            .roles
            .get(&role_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
        if role.tenant_id != tenant_id {
            return Err(StoreError::InvalidHierarchy(format!(
                "role {role_id} belongs to another tenant"
            )));
        }
        Ok(role)
    }
}

/// In-memory relation store.
///
/// Intended for tests/dev. A single write lock covers each mutating call, so
/// every call is one serializable transaction.
#[derive(Debug, Default)]
pub struct InMemoryRelationStore {
    tables: RwLock<Tables>,
}

impl InMemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl RelationStore for InMemoryRelationStore {
    async fn insert_tenant(
        &self,
        tenant: &Tenant,
        owner_role: &Role,
        owner_invitation: Option<&Invitation>,
        scope: EmailScope,
    ) -> Result<(), StoreError> {
        if owner_role.tenant_id != tenant.id || owner_role.id != tenant.owner_role_id {
            return Err(StoreError::TenantIsolation(
                "owner role does not belong to the tenant".into(),
            ));
        }
        if let Some(inv) = owner_invitation {
            if inv.tenant_id != tenant.id || inv.target_role_id != owner_role.id {
                return Err(StoreError::TenantIsolation(
                    "owner invitation does not target the owner role".into(),
                ));
            }
        }

        let mut t = self.write()?;
        if t.tenants.values().any(|row| row.tenant.slug == tenant.slug) {
            return Err(StoreError::UniqueViolation(Constraint::TenantSlug));
        }
        if t.roles.contains_key(&owner_role.id) {
            return Err(StoreError::UniqueViolation(Constraint::RoleId));
        }
        if let Some(inv) = owner_invitation {
            t.check_pending_slot(inv, scope)?;
        }

        t.tenants.insert(
            tenant.id,
            TenantRow {
                tenant: tenant.clone(),
                hierarchy_version: 0,
            },
        );
        t.roles.insert(owner_role.id, owner_role.clone());
        if let Some(inv) = owner_invitation {
            t.invitations.insert(inv.id, inv.clone());
        }
        Ok(())
    }

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.read()?.tenants.get(&id).map(|row| row.tenant.clone()))
    }

    async fn tenant_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>, StoreError> {
        Ok(self
            .read()?
            .tenants
            .values()
            .find(|row| &row.tenant.slug == slug)
            .map(|row| row.tenant.clone()))
    }

    async fn insert_role(&self, role: &Role, parent: Option<RoleId>) -> Result<u64, StoreError> {
        let mut t = self.write()?;
        if !t.tenants.contains_key(&role.tenant_id) {
            return Err(StoreError::NotFound(format!("tenant {}", role.tenant_id)));
        }
        if t.roles.contains_key(&role.id) {
            return Err(StoreError::UniqueViolation(Constraint::RoleId));
        }

        let edge = match parent {
            Some(parent_id) => {
                let parent = t.role_in(role.tenant_id, parent_id)?;
                let edge = HierarchyEdge::between(parent, role)
                    .map_err(|e| StoreError::InvalidHierarchy(e.to_string()))?;
                Some(edge)
            }
            None => None,
        };

        t.roles.insert(role.id, role.clone());
        if let Some(edge) = edge {
            t.edges.entry(role.tenant_id).or_default().push(edge);
        }
        t.bump(role.tenant_id)
    }

    async fn role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        let t = self.read()?;
        let mut roles: Vec<Role> = t
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        roles.sort_by_key(|r| r.id);
        Ok(roles)
    }

    async fn insert_edge(&self, edge: &HierarchyEdge) -> Result<u64, StoreError> {
        let mut t = self.write()?;
        t.role_in(edge.tenant_id, edge.parent_role_id)?;
        t.role_in(edge.tenant_id, edge.child_role_id)?;

        let mut graph = t.graph(edge.tenant_id)?;
        graph
            .link(edge.parent_role_id, edge.child_role_id)
            .map_err(|e| StoreError::InvalidHierarchy(e.to_string()))?;

        t.edges.entry(edge.tenant_id).or_default().push(*edge);
        t.bump(edge.tenant_id)
    }

    async fn edges(&self, tenant_id: TenantId) -> Result<Vec<HierarchyEdge>, StoreError> {
        Ok(self
            .read()?
            .edges
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn hierarchy_version(&self, tenant_id: TenantId) -> Result<u64, StoreError> {
        self.read()?
            .tenants
            .get(&tenant_id)
            .map(|row| row.hierarchy_version)
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))
    }

    async fn insert_invitation(
        &self,
        invitation: &Invitation,
        scope: EmailScope,
    ) -> Result<(), StoreError> {
        let mut t = self.write()?;
        if !t.tenants.contains_key(&invitation.tenant_id) {
            return Err(StoreError::NotFound(format!("tenant {}", invitation.tenant_id)));
        }
        match t.roles.get(&invitation.target_role_id) {
            Some(role) if role.tenant_id == invitation.tenant_id => {}
            _ => {
                return Err(StoreError::TenantIsolation(format!(
                    "role {} is not part of tenant {}",
                    invitation.target_role_id, invitation.tenant_id
                )));
            }
        }
        t.check_pending_slot(invitation, scope)?;
        t.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError> {
        Ok(self.read()?.invitations.get(&id).cloned())
    }

    async fn invitations(&self, tenant_id: TenantId) -> Result<Vec<Invitation>, StoreError> {
        let t = self.read()?;
        let mut out: Vec<Invitation> = t
            .invitations
            .values()
            .filter(|inv| inv.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by_key(|inv| (inv.created_at, inv.id));
        Ok(out)
    }

    async fn pending_invitations(&self, email: &Email) -> Result<Vec<Invitation>, StoreError> {
        let t = self.read()?;
        let mut out: Vec<Invitation> = t
            .invitations
            .values()
            .filter(|inv| inv.is_pending() && &inv.email == email)
            .cloned()
            .collect();
        out.sort_by_key(|inv| (inv.created_at, inv.id));
        Ok(out)
    }

    async fn expire_invitation(&self, id: InvitationId) -> Result<Invitation, StoreError> {
        let mut t = self.write()?;
        let inv = t
            .invitations
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("invitation {id}")))?;
        inv.expire()
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        Ok(inv.clone())
    }

    async fn accept_invitation(
        &self,
        id: InvitationId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> Result<Invitation, StoreError> {
        let mut t = self.write()?;

        let mut accepted = t
            .invitations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("invitation {id}")))?;
        accepted
            .accept(now)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        if profile.tenant_id != accepted.tenant_id
            || profile.role_id != accepted.target_role_id
            || profile.email != accepted.email
        {
            return Err(StoreError::TenantIsolation(
                "profile does not match the invitation it accepts".into(),
            ));
        }
        if t.profiles.contains_key(&profile.id) {
            return Err(StoreError::UniqueViolation(Constraint::ProfileId));
        }
        if t.profiles.values().any(|p| p.email == profile.email) {
            return Err(StoreError::UniqueViolation(Constraint::ProfileEmail));
        }

        t.profiles.insert(profile.id, profile.clone());
        t.invitations.insert(id, accepted.clone());
        Ok(accepted)
    }

    async fn profile(&self, id: PrincipalId) -> Result<Option<Profile>, StoreError> {
        Ok(self.read()?.profiles.get(&id).cloned())
    }

    async fn profile_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .read()?
            .profiles
            .values()
            .find(|p| &p.email == email)
            .cloned())
    }
}
