use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantgate_auth::{AppMetadata, PrincipalId};
use tenantgate_core::{InvitationId, RoleId, TenantId};
use tenantgate_infra::{IssuedToken, SignupMetadata};
use tenantgate_tenancy::{Invitation, Profile, Role};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub metadata: SignupMetadata,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

/// `tenant_id` is tolerated on the wire; the edge always lands in the caller's tenant.
#[derive(Debug, Deserialize)]
pub struct LinkEdgeRequest {
    pub parent_role_id: RoleId,
    pub child_role_id: RoleId,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub app_metadata: AppMetadata,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        let expires_in = issued.claims.exp - issued.claims.iat;
        Self {
            access_token: issued.access_token.into_inner(),
            token_type: "bearer",
            expires_in,
            app_metadata: issued.claims.app_metadata,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub permissions: Vec<String>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            tenant_id: role.tenant_id,
            name: role.name,
            permissions: role.permissions.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: InvitationId,
    pub tenant_id: TenantId,
    pub email: String,
    pub target_role_id: RoleId,
    pub invited_by: Option<PrincipalId>,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Invitation> for InvitationResponse {
    fn from(inv: Invitation) -> Self {
        Self {
            id: inv.id,
            tenant_id: inv.tenant_id,
            email: inv.email.to_string(),
            target_role_id: inv.target_role_id,
            invited_by: inv.invited_by,
            status: inv.status.as_str(),
            created_at: inv.created_at,
            expires_at: inv.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: PrincipalId,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            tenant_id: profile.tenant_id,
            role_id: profile.role_id,
            email: profile.email.to_string(),
            first_name: profile.first_name,
            last_name: profile.last_name,
        }
    }
}
