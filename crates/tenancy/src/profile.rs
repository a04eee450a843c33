use serde::{Deserialize, Serialize};

use tenantgate_auth::PrincipalId;
use tenantgate_core::{RoleId, TenantId};

use crate::{Email, Invitation};

/// Free-form signup metadata carried into the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Tenant membership record of a principal.
///
/// A principal without a profile is not a member of any tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same value as the principal id minted by the credential authority.
    pub id: PrincipalId,
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Profile {
    /// Profile for `principal` as admitted by `invitation`.
    pub fn from_invitation(
        principal: PrincipalId,
        invitation: &Invitation,
        metadata: ProfileMetadata,
    ) -> Self {
        Self {
            id: principal,
            tenant_id: invitation.tenant_id,
            role_id: invitation.target_role_id,
            email: invitation.email.clone(),
            first_name: clean(metadata.first_name),
            last_name: clean(metadata.last_name),
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
