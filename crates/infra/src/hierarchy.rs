//! Role Hierarchy Store: role creation, edge linking and descendant closure.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use tenantgate_auth::{
    Actor, Principal, RoleGraph, authorize_grant, authorize_role, is_owner, require_member,
};
use tenantgate_core::{RoleId, TenantId};
use tenantgate_tenancy::{HierarchyEdge, Role, Tenant};

use crate::error::GateError;
use crate::scope::ScopedStore;
use crate::store::RelationStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Commit the `parent -> role` edge together with the role.
    #[serde(default)]
    pub parent_role_id: Option<RoleId>,
}

/// Per-tenant graphs tagged with the hierarchy version they were built from.
#[derive(Debug, Default)]
struct DescendantCache {
    graphs: RwLock<HashMap<TenantId, (u64, Arc<RoleGraph>)>>,
}

impl DescendantCache {
    fn get(&self, tenant_id: TenantId, version: u64) -> Option<Arc<RoleGraph>> {
        let graphs = self.graphs.read().ok()?;
        match graphs.get(&tenant_id) {
            Some((cached, graph)) if *cached == version => Some(Arc::clone(graph)),
            _ => None,
        }
    }

    fn put(&self, tenant_id: TenantId, version: u64, graph: Arc<RoleGraph>) {
        if let Ok(mut graphs) = self.graphs.write() {
            graphs.insert(tenant_id, (version, graph));
        }
    }

    fn invalidate(&self, tenant_id: TenantId) {
        if let Ok(mut graphs) = self.graphs.write() {
            graphs.remove(&tenant_id);
        }
    }
}

pub struct RoleHierarchyStore<S: ?Sized> {
    store: Arc<S>,
    cache: DescendantCache,
}

impl<S> RoleHierarchyStore<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: DescendantCache::default(),
        }
    }

    async fn home_tenant(&self, principal: &Principal) -> Result<Tenant, GateError> {
        self.store
            .tenant(principal.tenant_id())
            .await?
            .ok_or_else(|| GateError::Forbidden("the caller's tenant does not exist".into()))
    }

    #[instrument(skip(self, actor, new_role), fields(name = %new_role.name), err)]
    pub async fn create_role(&self, actor: &Actor, new_role: NewRole) -> Result<Role, GateError> {
        let principal = require_member(actor)?;
        let tenant = self.home_tenant(principal).await?;
        let root = tenant.root();

        match new_role.parent_role_id {
            Some(parent) => authorize_role(principal, &root, parent)?,
            None if is_owner(principal, &root) => {}
            None => {
                return Err(GateError::Forbidden(
                    "only the owner may create a role without a parent".into(),
                ));
            }
        }

        let role = Role::define(tenant.id, &new_role.name, new_role.permissions)?;

        let caller_role = self
            .store
            .role(principal.claims.role_id)
            .await?
            .filter(|r| r.tenant_id == tenant.id)
            .ok_or_else(|| GateError::Forbidden("the caller's role does not exist".into()))?;
        authorize_grant(&caller_role.permissions, &role.permissions)?;

        let version = ScopedStore::for_actor(&*self.store, actor)
            .insert_role(&role, new_role.parent_role_id)
            .await?;
        self.cache.invalidate(tenant.id);

        info!(
            tenant_id = %tenant.id,
            role_id = %role.id,
            parent = ?new_role.parent_role_id,
            hierarchy_version = version,
            "role created"
        );
        Ok(role)
    }

    #[instrument(skip(self, actor), err)]
    pub async fn link_edge(
        &self,
        actor: &Actor,
        parent: RoleId,
        child: RoleId,
    ) -> Result<HierarchyEdge, GateError> {
        let principal = require_member(actor)?;
        let tenant = self.home_tenant(principal).await?;
        let root = tenant.root();

        authorize_role(principal, &root, parent)?;
        if !is_owner(principal, &root) {
            authorize_role(principal, &root, child)?;
        }

        let parent_role = self.role_of(tenant.id, parent).await?;
        let child_role = self.role_of(tenant.id, child).await?;
        let edge = HierarchyEdge::between(&parent_role, &child_role)?;

        let version = ScopedStore::for_actor(&*self.store, actor)
            .insert_edge(&edge)
            .await?;
        self.cache.invalidate(tenant.id);

        info!(
            tenant_id = %tenant.id,
            parent = %parent,
            child = %child,
            hierarchy_version = version,
            "hierarchy edge linked"
        );
        Ok(edge)
    }

    /// Role that must exist and belong to `tenant_id`.
    async fn role_of(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Role, GateError> {
        let role = self
            .store
            .role(role_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("role {role_id}")))?;
        if role.tenant_id != tenant_id {
            return Err(GateError::InvalidHierarchy(format!(
                "role {role_id} belongs to a different tenant"
            )));
        }
        Ok(role)
    }

    /// The tenant's current graph and the version it reflects.
    pub async fn graph(&self, tenant_id: TenantId) -> Result<(Arc<RoleGraph>, u64), GateError> {
        let version = self.store.hierarchy_version(tenant_id).await?;
        if let Some(graph) = self.cache.get(tenant_id, version) {
            return Ok((graph, version));
        }

        let edges = self.store.edges(tenant_id).await?;
        let graph = Arc::new(RoleGraph::from_edges(edges.iter().map(HierarchyEdge::pair))?);

        // Only cache what is known to match a single version.
        if self.store.hierarchy_version(tenant_id).await? == version {
            self.cache.put(tenant_id, version, Arc::clone(&graph));
        }
        debug!(tenant_id = %tenant_id, hierarchy_version = version, edges = graph.edge_count(), "role graph loaded");
        Ok((graph, version))
    }

    pub async fn descendant_ids(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
    ) -> Result<(BTreeSet<RoleId>, u64), GateError> {
        let (graph, version) = self.graph(tenant_id).await?;
        Ok((graph.descendants_of(role_id), version))
    }

    /// Descendant roles of `role_id`, which must be in the caller's tenant.
    #[instrument(skip(self, actor), err)]
    pub async fn descendants_of(&self, actor: &Actor, role_id: RoleId) -> Result<Vec<Role>, GateError> {
        let principal = require_member(actor)?;
        let tenant_id = principal.tenant_id();
        let role = self
            .store
            .role(role_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("role {role_id}")))?;
        if role.tenant_id != tenant_id {
            return Err(GateError::Forbidden(format!(
                "role {role_id} is not part of the caller's tenant"
            )));
        }

        let (ids, _) = self.descendant_ids(tenant_id, role_id).await?;
        let roles = ScopedStore::for_actor(&*self.store, actor)
            .roles(tenant_id)
            .await?;
        Ok(roles.into_iter().filter(|r| ids.contains(&r.id)).collect())
    }

    pub async fn list_roles(&self, actor: &Actor) -> Result<Vec<Role>, GateError> {
        let principal = require_member(actor)?;
        Ok(ScopedStore::for_actor(&*self.store, actor)
            .roles(principal.tenant_id())
            .await?)
    }

    pub async fn hierarchy_version(&self, tenant_id: TenantId) -> Result<u64, GateError> {
        Ok(self.store.hierarchy_version(tenant_id).await?)
    }
}
