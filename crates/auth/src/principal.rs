use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenantgate_core::TenantId;

use crate::ClaimsSet;

/// Identity of an authenticated principal.
///
/// Minted by the credential authority when an identity is created; a member's
/// profile reuses it as its primary key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A tenant member acting under the claims of a verified credential.
///
/// The claims are whatever was embedded at issuance time; they are not
/// refreshed while the credential lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub claims: ClaimsSet,
}

impl Principal {
    pub fn new(id: PrincipalId, claims: ClaimsSet) -> Self {
        Self { id, claims }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.claims.tenant_id
    }
}

/// Who is invoking an administrative operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// System-level operator identity (tenant provisioning only).
    Operator,
    /// An authenticated tenant member.
    Member(Principal),
}

impl Actor {
    pub fn is_operator(&self) -> bool {
        matches!(self, Actor::Operator)
    }

    pub fn as_member(&self) -> Option<&Principal> {
        match self {
            Actor::Member(p) => Some(p),
            Actor::Operator => None,
        }
    }
}
