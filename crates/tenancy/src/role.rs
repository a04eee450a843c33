use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tenantgate_auth::Permission;
use tenantgate_core::{DomainError, RoleId, TenantId};

use crate::Tenant;

pub const OWNER_ROLE_NAME: &str = "owner";

/// A named permission set belonging to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    /// The distinguished owner role of a freshly provisioned tenant.
    pub fn owner_of(tenant: &Tenant) -> Self {
        Self {
            id: tenant.owner_role_id,
            tenant_id: tenant.id,
            name: OWNER_ROLE_NAME.to_string(),
            permissions: BTreeSet::from([Permission::WILDCARD]),
        }
    }

    /// Validate and build a subordinate role (not yet persisted).
    pub fn define<I, P>(tenant_id: TenantId, name: &str, permissions: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("role name cannot be empty"));
        }

        let mut set = BTreeSet::new();
        for raw in permissions {
            let raw: String = raw.into();
            let perm = raw.trim();
            if perm.is_empty() || perm.chars().any(char::is_whitespace) {
                return Err(DomainError::validation(format!("invalid permission '{raw}'")));
            }
            set.insert(Permission::new(perm.to_string()));
        }

        Ok(Self {
            id: RoleId::new(),
            tenant_id,
            name: name.to_string(),
            permissions: set,
        })
    }
}

/// Directed edge: `parent` administers `child`. Never crosses tenants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub tenant_id: TenantId,
    pub parent_role_id: RoleId,
    pub child_role_id: RoleId,
}

impl HierarchyEdge {
    pub fn between(parent: &Role, child: &Role) -> Result<Self, DomainError> {
        if parent.tenant_id != child.tenant_id {
            return Err(DomainError::hierarchy("edge endpoints belong to different tenants"));
        }
        if parent.id == child.id {
            return Err(DomainError::hierarchy("a role cannot be linked to itself"));
        }
        Ok(Self {
            tenant_id: parent.tenant_id,
            parent_role_id: parent.id,
            child_role_id: child.id,
        })
    }

    pub fn pair(&self) -> (RoleId, RoleId) {
        (self.parent_role_id, self.child_role_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_trims_and_dedups_permissions() {
        let role = Role::define(
            TenantId::new(),
            " Manager ",
            ["public.deals:select", "public.deals:select "],
        )
        .unwrap();
        assert_eq!(role.name, "Manager");
        assert_eq!(role.permissions.len(), 1);
    }

    #[test]
    fn define_rejects_blank_name_and_permissions() {
        assert!(Role::define(TenantId::new(), "", Vec::<String>::new()).is_err());
        assert!(Role::define(TenantId::new(), "x", ["bad perm"]).is_err());
        assert!(Role::define(TenantId::new(), "x", [""]).is_err());
    }

    #[test]
    fn edge_cannot_cross_tenants() {
        let a = Role::define(TenantId::new(), "a", Vec::<String>::new()).unwrap();
        let b = Role::define(TenantId::new(), "b", Vec::<String>::new()).unwrap();
        assert!(matches!(
            HierarchyEdge::between(&a, &b),
            Err(DomainError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn edge_cannot_be_a_self_loop() {
        let a = Role::define(TenantId::new(), "a", Vec::<String>::new()).unwrap();
        assert!(HierarchyEdge::between(&a, &a).is_err());
    }
}
