use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantgate_core::{RoleId, TenantId};

use crate::{AuthError, PrincipalId};

/// Authorization-relevant facts about a member, derived at issuance time.
///
/// Never persisted: it is recomputed from profile and hierarchy state every
/// time a credential is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsSet {
    pub tenant_id: TenantId,

    #[serde(rename = "role")]
    pub role_id: RoleId,

    /// Roles reachable from `role_id` through hierarchy edges (excludes `role_id`).
    pub descendants: BTreeSet<RoleId>,
}

impl ClaimsSet {
    pub fn new(tenant_id: TenantId, role_id: RoleId, descendants: BTreeSet<RoleId>) -> Self {
        Self {
            tenant_id,
            role_id,
            descendants,
        }
    }

    /// Whether the holder may act on `role`: its own role or one of its descendants.
    pub fn acts_on(&self, role: RoleId) -> bool {
        self.role_id == role || self.descendants.contains(&role)
    }
}

/// Application-controlled section of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(flatten)]
    pub claims: ClaimsSet,

    /// Tenant hierarchy version the claims were computed against.
    pub hierarchy_version: u64,
}

/// Access-token claims (transport-agnostic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    pub app_metadata: AppMetadata,

    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Deterministically validate the token time window.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// the token codec.
pub fn validate_claims(claims: &AccessTokenClaims, now: DateTime<Utc>) -> Result<(), AuthError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(AuthError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(AuthError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(AuthError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(iat: DateTime<Utc>, exp: DateTime<Utc>) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: PrincipalId::new(),
            app_metadata: AppMetadata {
                claims: ClaimsSet::new(TenantId::new(), RoleId::new(), BTreeSet::new()),
                hierarchy_version: 1,
            },
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        }
    }

    #[test]
    fn acts_on_own_role_and_descendants_only() {
        let own = RoleId::new();
        let child = RoleId::new();
        let set = ClaimsSet::new(TenantId::new(), own, BTreeSet::from([child]));
        assert!(set.acts_on(own));
        assert!(set.acts_on(child));
        assert!(!set.acts_on(RoleId::new()));
    }

    #[test]
    fn time_window_is_enforced() {
        let now = Utc::now();
        let ok = claims(now - Duration::minutes(1), now + Duration::minutes(5));
        assert_eq!(validate_claims(&ok, now), Ok(()));

        let expired = claims(now - Duration::minutes(10), now - Duration::minutes(1));
        assert_eq!(validate_claims(&expired, now), Err(AuthError::Expired));

        let future = claims(now + Duration::minutes(1), now + Duration::minutes(5));
        assert_eq!(validate_claims(&future, now), Err(AuthError::NotYetValid));

        let inverted = claims(now, now - Duration::minutes(1));
        assert_eq!(validate_claims(&inverted, now), Err(AuthError::InvalidTimeWindow));
    }

    #[test]
    fn app_metadata_uses_flat_role_field() {
        let role = RoleId::new();
        let meta = AppMetadata {
            claims: ClaimsSet::new(TenantId::new(), role, BTreeSet::new()),
            hierarchy_version: 3,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["role"], serde_json::json!(role.to_string()));
        assert!(json["descendants"].is_array());
        assert_eq!(json["hierarchy_version"], 3);
    }
}
