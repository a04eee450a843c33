//! Postgres-backed relation store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation(constraint)` |
//! | Database (foreign key violation) | `23503` | `TenantIsolation` |
//! | Database (check violation) | `23514` | `InvalidHierarchy` |
//! | anything else | | `Backend` |
//!
//! ## Concurrency
//!
//! Role and edge mutations lock the owning tenant row (`FOR UPDATE`), so the
//! acyclicity check and the version bump of one tenant are serialized.
//! Under [`EmailScope::Global`] invitation inserts take a transaction-scoped
//! advisory lock on the email before checking for other pending rows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use tenantgate_auth::{Permission, PrincipalId, RoleGraph};
use tenantgate_core::{InvitationId, RoleId, TenantId};
use tenantgate_tenancy::{
    Email, HierarchyEdge, Invitation, InvitationStatus, Profile, Role, Slug, Tenant,
};

use super::{Constraint, EmailScope, RelationStore, StoreError};

#[derive(Debug, Clone)]
pub struct PostgresRelationStore {
    pool: Arc<PgPool>,
}

impl PostgresRelationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Lock the tenant row for the rest of the transaction and return its version.
async fn lock_tenant(
    tx: &mut Transaction<'static, Postgres>,
    tenant_id: TenantId,
) -> Result<u64, StoreError> {
    let row = sqlx::query("SELECT hierarchy_version FROM tenants WHERE id = $1 FOR UPDATE")
        .bind(tenant_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_tenant", e))?
        .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;
    let version: i64 = row
        .try_get("hierarchy_version")
        .map_err(|e| map_sqlx_error("lock_tenant", e))?;
    Ok(version as u64)
}

async fn bump_version(
    tx: &mut Transaction<'static, Postgres>,
    tenant_id: TenantId,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        "UPDATE tenants SET hierarchy_version = hierarchy_version + 1 WHERE id = $1 RETURNING hierarchy_version",
    )
    .bind(tenant_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("bump_version", e))?;
    let version: i64 = row
        .try_get("hierarchy_version")
        .map_err(|e| map_sqlx_error("bump_version", e))?;
    Ok(version as u64)
}

async fn role_in_tx(
    tx: &mut Transaction<'static, Postgres>,
    tenant_id: TenantId,
    role_id: RoleId,
) -> Result<Role, StoreError> {
    let row = sqlx::query("SELECT id, tenant_id, name, permissions FROM roles WHERE id = $1")
        .bind(role_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_role", e))?
        .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
    let role = role_from_row(&row)?;
    if role.tenant_id != tenant_id {
        return Err(StoreError::InvalidHierarchy(format!(
            "role {role_id} belongs to another tenant"
        )));
    }
    Ok(role)
}

async fn insert_edge_row(
    tx: &mut Transaction<'static, Postgres>,
    edge: &HierarchyEdge,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO hierarchy_edges (tenant_id, parent_role_id, child_role_id) VALUES ($1, $2, $3)",
    )
    .bind(edge.tenant_id.as_uuid())
    .bind(edge.parent_role_id.as_uuid())
    .bind(edge.child_role_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_edge", e))?;
    Ok(())
}

async fn insert_invitation_row(
    tx: &mut Transaction<'static, Postgres>,
    inv: &Invitation,
    scope: EmailScope,
) -> Result<(), StoreError> {
    if scope == EmailScope::Global {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(inv.email.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_email", e))?;
        let taken = sqlx::query(
            "SELECT 1 FROM invitations WHERE email = $1 AND status = 'pending' AND id <> $2 LIMIT 1",
        )
        .bind(inv.email.as_str())
        .bind(inv.id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_pending", e))?;
        if taken.is_some() {
            return Err(StoreError::UniqueViolation(Constraint::PendingInvitation));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO invitations (
            id, tenant_id, email, target_role_id, invited_by,
            status, created_at, expires_at, accepted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(inv.id.as_uuid())
    .bind(inv.tenant_id.as_uuid())
    .bind(inv.email.as_str())
    .bind(inv.target_role_id.as_uuid())
    .bind(inv.invited_by.map(|p| *p.as_uuid()))
    .bind(inv.status.as_str())
    .bind(inv.created_at)
    .bind(inv.expires_at)
    .bind(inv.accepted_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_invitation", e))?;
    Ok(())
}

const INVITATION_COLUMNS: &str = "id, tenant_id, email, target_role_id, invited_by, status, created_at, expires_at, accepted_at";

#[async_trait]
impl RelationStore for PostgresRelationStore {
    #[instrument(skip(self, tenant, owner_role, owner_invitation), fields(tenant_id = %tenant.id, slug = %tenant.slug.as_str()), err)]
    async fn insert_tenant(
        &self,
        tenant: &Tenant,
        owner_role: &Role,
        owner_invitation: Option<&Invitation>,
        scope: EmailScope,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO tenants (id, name, slug, owner_role_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(tenant.slug.as_str())
        .bind(tenant.owner_role_id.as_uuid())
        .bind(tenant.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_tenant", e))?;

        insert_role_row(&mut tx, owner_role).await?;

        if let Some(inv) = owner_invitation {
            insert_invitation_row(&mut tx, inv, scope).await?;
        }

        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, slug, owner_role_id, created_at FROM tenants WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_tenant", e))?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    #[instrument(skip(self, slug), fields(slug = %slug.as_str()), err)]
    async fn tenant_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, slug, owner_role_id, created_at FROM tenants WHERE slug = $1",
        )
        .bind(slug.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_tenant_by_slug", e))?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    #[instrument(skip(self, role), fields(tenant_id = %role.tenant_id, role_id = %role.id), err)]
    async fn insert_role(&self, role: &Role, parent: Option<RoleId>) -> Result<u64, StoreError> {
        let mut tx = self.begin().await?;
        lock_tenant(&mut tx, role.tenant_id).await?;

        let parent = match parent {
            Some(parent_id) => Some(role_in_tx(&mut tx, role.tenant_id, parent_id).await?),
            None => None,
        };

        insert_role_row(&mut tx, role).await?;

        if let Some(parent) = parent {
            let edge = HierarchyEdge::between(&parent, role)
                .map_err(|e| StoreError::InvalidHierarchy(e.to_string()))?;
            insert_edge_row(&mut tx, &edge).await?;
        }

        let version = bump_version(&mut tx, role.tenant_id).await?;
        commit(tx).await?;
        Ok(version)
    }

    #[instrument(skip(self), err)]
    async fn role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT id, tenant_id, name, permissions FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, permissions FROM roles WHERE tenant_id = $1 ORDER BY id",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self, edge), fields(tenant_id = %edge.tenant_id, parent = %edge.parent_role_id, child = %edge.child_role_id), err)]
    async fn insert_edge(&self, edge: &HierarchyEdge) -> Result<u64, StoreError> {
        let mut tx = self.begin().await?;
        lock_tenant(&mut tx, edge.tenant_id).await?;
        role_in_tx(&mut tx, edge.tenant_id, edge.parent_role_id).await?;
        role_in_tx(&mut tx, edge.tenant_id, edge.child_role_id).await?;

        let rows = sqlx::query(
            "SELECT tenant_id, parent_role_id, child_role_id FROM hierarchy_edges WHERE tenant_id = $1",
        )
        .bind(edge.tenant_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_edges", e))?;
        let existing = rows.iter().map(edge_from_row).collect::<Result<Vec<_>, _>>()?;

        let mut graph = RoleGraph::from_edges(existing.iter().map(HierarchyEdge::pair))
            .map_err(|e| StoreError::InvalidHierarchy(e.to_string()))?;
        graph
            .link(edge.parent_role_id, edge.child_role_id)
            .map_err(|e| StoreError::InvalidHierarchy(e.to_string()))?;

        insert_edge_row(&mut tx, edge).await?;
        let version = bump_version(&mut tx, edge.tenant_id).await?;
        commit(tx).await?;
        Ok(version)
    }

    #[instrument(skip(self), err)]
    async fn edges(&self, tenant_id: TenantId) -> Result<Vec<HierarchyEdge>, StoreError> {
        let rows = sqlx::query(
            "SELECT tenant_id, parent_role_id, child_role_id FROM hierarchy_edges WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_edges", e))?;
        rows.iter().map(edge_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn hierarchy_version(&self, tenant_id: TenantId) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT hierarchy_version FROM tenants WHERE id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("hierarchy_version", e))?
            .ok_or_else(|| StoreError::NotFound(format!("tenant {tenant_id}")))?;
        let version: i64 = row
            .try_get("hierarchy_version")
            .map_err(|e| map_sqlx_error("hierarchy_version", e))?;
        Ok(version as u64)
    }

    #[instrument(skip(self, invitation), fields(tenant_id = %invitation.tenant_id, invitation_id = %invitation.id), err)]
    async fn insert_invitation(
        &self,
        invitation: &Invitation,
        scope: EmailScope,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        insert_invitation_row(&mut tx, invitation, scope).await?;
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_invitation", e))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn invitations(&self, tenant_id: TenantId) -> Result<Vec<Invitation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE tenant_id = $1 ORDER BY created_at, id"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_invitations", e))?;
        rows.iter().map(invitation_from_row).collect()
    }

    #[instrument(skip(self, email), err)]
    async fn pending_invitations(&self, email: &Email) -> Result<Vec<Invitation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE email = $1 AND status = 'pending' ORDER BY created_at, id"
        ))
        .bind(email.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_invitations", e))?;
        rows.iter().map(invitation_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn expire_invitation(&self, id: InvitationId) -> Result<Invitation, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE invitations SET status = 'expired' WHERE id = $1 AND status = 'pending' RETURNING {INVITATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expire_invitation", e))?;
        match row {
            Some(row) => invitation_from_row(&row),
            None => Err(StoreError::Conflict(format!("invitation {id} is not pending"))),
        }
    }

    #[instrument(skip(self, profile, now), fields(principal_id = %profile.id, tenant_id = %profile.tenant_id), err)]
    async fn accept_invitation(
        &self,
        id: InvitationId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> Result<Invitation, StoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_invitation", e))?
        .ok_or_else(|| StoreError::NotFound(format!("invitation {id}")))?;

        let mut accepted = invitation_from_row(&row)?;
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

        sqlx::query(
            "INSERT INTO profiles (id, tenant_id, role_id, email, first_name, last_name) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(profile.id.as_uuid())
        .bind(profile.tenant_id.as_uuid())
        .bind(profile.role_id.as_uuid())
        .bind(profile.email.as_str())
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_profile", e))?;

        sqlx::query("UPDATE invitations SET status = $2, accepted_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(accepted.status.as_str())
            .bind(accepted.accepted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("accept_invitation", e))?;

        commit(tx).await?;
        Ok(accepted)
    }

    #[instrument(skip(self), err)]
    async fn profile(&self, id: PrincipalId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, role_id, email, first_name, last_name FROM profiles WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_profile", e))?;
        row.as_ref().map(profile_from_row).transpose()
    }

    #[instrument(skip(self, email), err)]
    async fn profile_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, role_id, email, first_name, last_name FROM profiles WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_profile_by_email", e))?;
        row.as_ref().map(profile_from_row).transpose()
    }
}

async fn insert_role_row(
    tx: &mut Transaction<'static, Postgres>,
    role: &Role,
) -> Result<(), StoreError> {
    let permissions: Vec<String> = role.permissions.iter().map(|p| p.as_str().to_string()).collect();
    sqlx::query("INSERT INTO roles (id, tenant_id, name, permissions) VALUES ($1, $2, $3, $4)")
        .bind(role.id.as_uuid())
        .bind(role.tenant_id.as_uuid())
        .bind(&role.name)
        .bind(&permissions)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
    Ok(())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn decode_email(raw: String) -> Result<Email, StoreError> {
    Email::parse(&raw).map_err(|e| StoreError::Backend(format!("stored email is invalid: {e}")))
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant, StoreError> {
    let slug: String = get(row, "slug")?;
    Ok(Tenant {
        id: TenantId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        slug: Slug::parse(&slug)
            .map_err(|e| StoreError::Backend(format!("stored slug is invalid: {e}")))?,
        owner_role_id: RoleId::from_uuid(get(row, "owner_role_id")?),
        created_at: get(row, "created_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let permissions: Vec<String> = get(row, "permissions")?;
    Ok(Role {
        id: RoleId::from_uuid(get(row, "id")?),
        tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
        name: get(row, "name")?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
    })
}

fn edge_from_row(row: &PgRow) -> Result<HierarchyEdge, StoreError> {
    Ok(HierarchyEdge {
        tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
        parent_role_id: RoleId::from_uuid(get(row, "parent_role_id")?),
        child_role_id: RoleId::from_uuid(get(row, "child_role_id")?),
    })
}

fn invitation_from_row(row: &PgRow) -> Result<Invitation, StoreError> {
    let status: String = get(row, "status")?;
    let invited_by: Option<Uuid> = get(row, "invited_by")?;
    Ok(Invitation {
        id: InvitationId::from_uuid(get(row, "id")?),
        tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
        email: decode_email(get(row, "email")?)?,
        target_role_id: RoleId::from_uuid(get(row, "target_role_id")?),
        invited_by: invited_by.map(PrincipalId::from_uuid),
        status: InvitationStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown invitation status '{status}'")))?,
        created_at: get(row, "created_at")?,
        expires_at: get(row, "expires_at")?,
        accepted_at: get(row, "accepted_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        id: PrincipalId::from_uuid(get(row, "id")?),
        tenant_id: TenantId::from_uuid(get(row, "tenant_id")?),
        role_id: RoleId::from_uuid(get(row, "role_id")?),
        email: decode_email(get(row, "email")?)?,
        first_name: get(row, "first_name")?,
        last_name: get(row, "last_name")?,
    })
}

fn constraint_named(name: &str) -> Option<Constraint> {
    match name {
        "tenants_slug_key" => Some(Constraint::TenantSlug),
        "roles_pkey" => Some(Constraint::RoleId),
        "hierarchy_edges_pkey" => Some(Constraint::HierarchyEdge),
        "invitations_pending_email_idx" => Some(Constraint::PendingInvitation),
        "profiles_pkey" => Some(Constraint::ProfileId),
        "profiles_email_key" => Some(Constraint::ProfileEmail),
        _ => None,
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => match db_err.constraint().and_then(constraint_named) {
                    Some(constraint) => StoreError::UniqueViolation(constraint),
                    None => StoreError::Backend(msg),
                },
                Some("23503") => StoreError::TenantIsolation(msg),
                Some("23514") => StoreError::InvalidHierarchy(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
