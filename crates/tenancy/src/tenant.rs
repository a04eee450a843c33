use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantgate_auth::TenantRoot;
use tenantgate_core::{DomainError, RoleId, TenantId};

const MAX_SLUG_LEN: usize = 63;

/// URL-safe unique tenant handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let slug = raw.trim().to_lowercase();
        if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
            return Err(DomainError::validation(format!(
                "slug must be 1..={MAX_SLUG_LEN} characters"
            )));
        }
        if !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(DomainError::validation(
                "slug may only contain a-z, 0-9 and '-'",
            ));
        }
        if slug.starts_with('-') || slug.ends_with('-') {
            return Err(DomainError::validation("slug cannot start or end with '-'"));
        }
        Ok(Self(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Slug {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(value: Slug) -> Self {
        value.0
    }
}

/// An isolated organisational unit.
///
/// Created once by provisioning together with its owner role; the owner role
/// id is fixed for the tenant's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub slug: Slug,
    pub owner_role_id: RoleId,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Validate and build a new tenant record (not yet persisted).
    pub fn provision(
        name: &str,
        slug: Slug,
        owner_role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("tenant name cannot be empty"));
        }
        Ok(Self {
            id: TenantId::new(),
            name: name.to_string(),
            slug,
            owner_role_id,
            created_at: now,
        })
    }

    pub fn root(&self) -> TenantRoot {
        TenantRoot {
            tenant_id: self.id,
            owner_role_id: self.owner_role_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_normalized() {
        assert_eq!(Slug::parse(" Acme-1700 ").unwrap().as_str(), "acme-1700");
    }

    #[test]
    fn slug_rejects_bad_shapes() {
        let too_long = "a".repeat(64);
        for raw in ["", "-acme", "acme-", "acme corp", "acme_corp", too_long.as_str()] {
            assert!(Slug::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn provision_requires_a_name() {
        let slug = Slug::parse("acme").unwrap();
        assert!(Tenant::provision("   ", slug.clone(), RoleId::new(), Utc::now()).is_err());

        let tenant = Tenant::provision(" Acme Corp ", slug, RoleId::new(), Utc::now()).unwrap();
        assert_eq!(tenant.name, "Acme Corp");
        assert_eq!(tenant.root().tenant_id, tenant.id);
    }
}
