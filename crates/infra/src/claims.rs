//! Claims Issuer: derives `{tenant, role, descendants}` from persisted state.

use std::sync::Arc;

use tracing::{debug, instrument};

use tenantgate_auth::{ClaimsSet, PrincipalId};

use crate::error::GateError;
use crate::hierarchy::RoleHierarchyStore;
use crate::store::RelationStore;

pub struct ClaimsIssuer<S: ?Sized> {
    store: Arc<S>,
    hierarchy: Arc<RoleHierarchyStore<S>>,
}

impl<S> ClaimsIssuer<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(store: Arc<S>, hierarchy: Arc<RoleHierarchyStore<S>>) -> Self {
        Self { store, hierarchy }
    }

    pub async fn issue_claims(&self, principal: PrincipalId) -> Result<ClaimsSet, GateError> {
        Ok(self.issue_claims_versioned(principal).await?.0)
    }

    /// Claims plus the hierarchy version they were computed from.
    #[instrument(skip(self), err)]
    pub async fn issue_claims_versioned(
        &self,
        principal: PrincipalId,
    ) -> Result<(ClaimsSet, u64), GateError> {
        let profile = self
            .store
            .profile(principal)
            .await?
            .ok_or(GateError::NotAMember(principal))?;

        let (descendants, version) = self
            .hierarchy
            .descendant_ids(profile.tenant_id, profile.role_id)
            .await?;

        debug!(
            tenant_id = %profile.tenant_id,
            role_id = %profile.role_id,
            descendants = descendants.len(),
            hierarchy_version = version,
            "claims issued"
        );
        Ok((
            ClaimsSet::new(profile.tenant_id, profile.role_id, descendants),
            version,
        ))
    }
}
