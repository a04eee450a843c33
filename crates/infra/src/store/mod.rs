//! Relation Store boundary.
//!
//! Transactional access to tenants, roles, hierarchy edges, invitations and
//! profiles. Every mutating method is one atomic unit: it either commits all of
//! its rows or none of them, and uniqueness is enforced at commit time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tenantgate_auth::PrincipalId;
use tenantgate_core::{InvitationId, RoleId, TenantId};
use tenantgate_tenancy::{Email, HierarchyEdge, Invitation, Profile, Role, Slug, Tenant};

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryRelationStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRelationStore;

/// Uniqueness constraints the store enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    TenantSlug,
    RoleId,
    HierarchyEdge,
    PendingInvitation,
    ProfileId,
    ProfileEmail,
}

impl core::fmt::Display for Constraint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Constraint::TenantSlug => "tenants.slug",
            Constraint::RoleId => "roles.id",
            Constraint::HierarchyEdge => "hierarchy.edge",
            Constraint::PendingInvitation => "invitations.pending",
            Constraint::ProfileId => "profiles.id",
            Constraint::ProfileEmail => "profiles.email",
        })
    }
}

/// Which key a Pending invitation must be unique on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailScope {
    /// One Pending invitation per email across all tenants.
    #[default]
    Global,
    /// One Pending invitation per `(tenant_id, email)`.
    Tenant,
}

impl EmailScope {
    /// Whether `existing` occupies the uniqueness slot `candidate` needs.
    pub fn collides(&self, existing: &Invitation, candidate: &Invitation) -> bool {
        existing.is_pending()
            && existing.email == candidate.email
            && match self {
                EmailScope::Global => true,
                EmailScope::Tenant => existing.tenant_id == candidate.tenant_id,
            }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(Constraint),

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Compare-and-set lost (e.g. the invitation is no longer pending).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Tenant, owner role and optional owner invitation, in one transaction.
    async fn insert_tenant(
        &self,
        tenant: &Tenant,
        owner_role: &Role,
        owner_invitation: Option<&Invitation>,
        scope: EmailScope,
    ) -> Result<(), StoreError>;

    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;

    async fn tenant_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>, StoreError>;

    /// Insert a role, optionally with the `parent -> role` edge. Returns the
    /// tenant's new hierarchy version.
    async fn insert_role(&self, role: &Role, parent: Option<RoleId>) -> Result<u64, StoreError>;

    async fn role(&self, id: RoleId) -> Result<Option<Role>, StoreError>;

    async fn roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError>;

    /// Insert an edge after re-checking endpoints and acyclicity inside the
    /// transaction. Returns the tenant's new hierarchy version.
    async fn insert_edge(&self, edge: &HierarchyEdge) -> Result<u64, StoreError>;

    async fn edges(&self, tenant_id: TenantId) -> Result<Vec<HierarchyEdge>, StoreError>;

    /// Bumped by every committed role or edge mutation of the tenant.
    async fn hierarchy_version(&self, tenant_id: TenantId) -> Result<u64, StoreError>;

    async fn insert_invitation(
        &self,
        invitation: &Invitation,
        scope: EmailScope,
    ) -> Result<(), StoreError>;

    async fn invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError>;

    async fn invitations(&self, tenant_id: TenantId) -> Result<Vec<Invitation>, StoreError>;

    /// All Pending invitations for `email`, across tenants.
    async fn pending_invitations(&self, email: &Email) -> Result<Vec<Invitation>, StoreError>;

    /// `Pending -> Expired`. Fails with `Conflict` if no longer pending.
    async fn expire_invitation(&self, id: InvitationId) -> Result<Invitation, StoreError>;

    /// Insert `profile` and move the invitation `Pending -> Accepted`, atomically.
    async fn accept_invitation(
        &self,
        id: InvitationId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> Result<Invitation, StoreError>;

    async fn profile(&self, id: PrincipalId) -> Result<Option<Profile>, StoreError>;

    async fn profile_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError>;
}
