//! Wiring of the store, the five core components and the credential side.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use tenantgate_auth::{Hs256TokenCodec, JwtValidator};

use crate::claims::ClaimsIssuer;
use crate::clock::Clock;
use crate::config::GateConfig;
use crate::credentials::{CredentialAuthority, LocalCredentialAuthority};
use crate::hierarchy::RoleHierarchyStore;
use crate::invitations::InvitationManager;
use crate::onboarding::OnboardingGate;
use crate::provisioning::TenantProvisioner;
use crate::sessions::{CredentialVerifier, SessionIssuer};
use crate::store::RelationStore;

pub struct Gatekeeper<S: ?Sized> {
    pub store: Arc<S>,
    pub hierarchy: Arc<RoleHierarchyStore<S>>,
    pub provisioner: Arc<TenantProvisioner<S>>,
    pub invitations: Arc<InvitationManager<S>>,
    pub onboarding: Arc<OnboardingGate<S>>,
    pub claims: Arc<ClaimsIssuer<S>>,
    pub credentials: Arc<dyn CredentialAuthority>,
    pub sessions: Arc<SessionIssuer<S>>,
    pub verifier: Arc<CredentialVerifier<S>>,
    operator_key: Option<String>,
}

impl<S> Gatekeeper<S>
where
    S: RelationStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, config: &GateConfig, clock: Arc<dyn Clock>) -> Self {
        let codec = Arc::new(Hs256TokenCodec::new(config.jwt_secret.as_bytes(), config.token_ttl));
        let authority = |gate: Arc<OnboardingGate<S>>| {
            LocalCredentialAuthority::new(gate, Arc::clone(&codec), Arc::clone(&clock))
        };
        Self::assemble(store, config, Arc::clone(&clock), codec.clone(), authority)
    }

    /// Like [`Gatekeeper::new`], but lets the caller adjust the local authority.
    pub fn assemble<F>(
        store: Arc<S>,
        config: &GateConfig,
        clock: Arc<dyn Clock>,
        codec: Arc<Hs256TokenCodec>,
        authority: F,
    ) -> Self
    where
        F: FnOnce(Arc<OnboardingGate<S>>) -> LocalCredentialAuthority<S>,
    {
        let hierarchy = Arc::new(RoleHierarchyStore::new(Arc::clone(&store)));
        let invitations = Arc::new(InvitationManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.invitation_ttl,
            config.email_scope,
        ));
        let provisioner = Arc::new(TenantProvisioner::new(
            Arc::clone(&store),
            Arc::clone(&invitations),
            Arc::clone(&clock),
            config.invitation_ttl,
            config.email_scope,
        ));
        let onboarding = Arc::new(OnboardingGate::new(
            Arc::clone(&store),
            Arc::clone(&invitations),
            Arc::clone(&clock),
        ));
        let claims = Arc::new(ClaimsIssuer::new(Arc::clone(&store), Arc::clone(&hierarchy)));

        let credentials: Arc<dyn CredentialAuthority> = Arc::new(authority(Arc::clone(&onboarding)));
        let sessions = Arc::new(SessionIssuer::new(Arc::clone(&credentials), Arc::clone(&claims)));

        let validator: Arc<dyn JwtValidator> = codec;
        let verifier = Arc::new(CredentialVerifier::new(
            validator,
            Arc::clone(&hierarchy),
            config.claims_refresh,
            clock,
        ));

        Self {
            store,
            hierarchy,
            provisioner,
            invitations,
            onboarding,
            claims,
            credentials,
            sessions,
            verifier,
            operator_key: config.operator_key.clone(),
        }
    }

    /// Whether `presented` is the configured operator key.
    pub fn is_operator_key(&self, presented: &str) -> bool {
        match &self.operator_key {
            Some(key) => constant_time_eq(key.as_bytes(), presented.as_bytes()),
            None => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_key_comparison() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn operator_key_must_be_configured_and_exact() {
        use crate::clock::SystemClock;
        use crate::store::InMemoryRelationStore;

        let gate = |operator_key: Option<&str>| {
            let config = GateConfig {
                operator_key: operator_key.map(str::to_string),
                ..GateConfig::default()
            };
            Gatekeeper::new(Arc::new(InMemoryRelationStore::new()), &config, Arc::new(SystemClock))
        };

        let configured = gate(Some("op-key"));
        assert!(configured.is_operator_key("op-key"));
        assert!(!configured.is_operator_key("op-kez"));
        assert!(!configured.is_operator_key(""));

        assert!(!gate(None).is_operator_key(""));
    }
}
