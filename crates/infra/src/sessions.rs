//! Sign-in (authenticate, derive claims, mint a token) and token verification.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use tenantgate_auth::{AuthError, JwtValidator, Principal, PrincipalId};

use crate::claims::ClaimsIssuer;
use crate::clock::Clock;
use crate::config::ClaimsRefreshPolicy;
use crate::credentials::{CredentialAuthority, IssuedToken};
use crate::error::GateError;
use crate::hierarchy::RoleHierarchyStore;
use crate::store::RelationStore;

pub struct SessionIssuer<S: ?Sized> {
    authority: Arc<dyn CredentialAuthority>,
    claims: Arc<ClaimsIssuer<S>>,
}

impl<S> SessionIssuer<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(authority: Arc<dyn CredentialAuthority>, claims: Arc<ClaimsIssuer<S>>) -> Self {
        Self { authority, claims }
    }

    #[instrument(skip(self, email, secret), err)]
    pub async fn sign_in(&self, email: &str, secret: &str) -> Result<IssuedToken, GateError> {
        let principal = self.authority.authenticate(email, secret).await?;
        self.reissue(principal).await
    }

    /// Mint a fresh token from current persisted state.
    pub async fn reissue(&self, principal: PrincipalId) -> Result<IssuedToken, GateError> {
        let (claims, version) = self.claims.issue_claims_versioned(principal).await?;
        let issued = self.authority.issue_token(principal, &claims, version).await?;
        info!(
            principal_id = %principal,
            tenant_id = %claims.tenant_id,
            hierarchy_version = version,
            "token issued"
        );
        Ok(issued)
    }
}

/// Turns a bearer token back into a [`Principal`].
pub struct CredentialVerifier<S: ?Sized> {
    validator: Arc<dyn JwtValidator>,
    hierarchy: Arc<RoleHierarchyStore<S>>,
    policy: ClaimsRefreshPolicy,
    clock: Arc<dyn Clock>,
}

impl<S> CredentialVerifier<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(
        validator: Arc<dyn JwtValidator>,
        hierarchy: Arc<RoleHierarchyStore<S>>,
        policy: ClaimsRefreshPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validator,
            hierarchy,
            policy,
            clock,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Principal, GateError> {
        let claims = self.validator.validate(token, self.clock.now())?;
        let tenant_id = claims.app_metadata.claims.tenant_id;

        if self.policy == ClaimsRefreshPolicy::RevokeOnHierarchyChange {
            let current = self
                .hierarchy
                .hierarchy_version(tenant_id)
                .await
                .map_err(|e| match e {
                    GateError::NotFound(_) => {
                        GateError::Auth(AuthError::InvalidToken("unknown tenant".into()))
                    }
                    other => other,
                })?;
            if claims.app_metadata.hierarchy_version < current {
                warn!(
                    principal_id = %claims.sub,
                    tenant_id = %tenant_id,
                    token_version = claims.app_metadata.hierarchy_version,
                    current_version = current,
                    "rejecting stale credential"
                );
                return Err(AuthError::StaleCredential.into());
            }
        }

        Ok(Principal::new(claims.sub, claims.app_metadata.claims))
    }
}
