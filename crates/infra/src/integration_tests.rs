//! Integration tests for the full onboarding and authorization flow.
//!
//! Provision → roles/edges → invitation → gated signup → sign-in → claims,
//! all against the in-memory relation store.
//!
//! Verifies:
//! - Tenant isolation under attacker-controlled fields
//! - Invitation and onboarding uniqueness under concurrency
//! - Claims reflect the hierarchy only at (re-)issuance

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use argon2::{Algorithm, Argon2, Params, Version};
    use chrono::{Duration, Utc};

    use tenantgate_auth::{Actor, AuthError, Hs256TokenCodec, PrincipalId};
    use tenantgate_core::{InvitationId, RoleId};
    use tenantgate_tenancy::{Email, InvitationStatus, Profile};

    use crate::clock::{Clock, ManualClock};
    use crate::config::{ClaimsRefreshPolicy, GateConfig};
    use crate::credentials::{IssuedToken, LocalCredentialAuthority};
    use crate::error::GateError;
    use crate::gatekeeper::Gatekeeper;
    use crate::hierarchy::NewRole;
    use crate::invitations::InvitationRequest;
    use crate::onboarding::SignupMetadata;
    use crate::provisioning::{ProvisionRequest, ProvisionedTenant};
    use crate::store::{InMemoryRelationStore, RelationStore};

    const PASSWORD: &str = "correct horse battery";

    type Gate = Gatekeeper<InMemoryRelationStore>;

    fn cheap_hasher() -> Argon2<'static> {
        Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(Params::MIN_M_COST, 1, 1, None).unwrap(),
        )
    }

    fn setup_with(config: GateConfig) -> (Gate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let codec = Arc::new(Hs256TokenCodec::new(config.jwt_secret.as_bytes(), config.token_ttl));
        let authority_codec = Arc::clone(&codec);
        let authority_clock = Arc::clone(&dyn_clock);
        let gate = Gatekeeper::assemble(
            Arc::new(InMemoryRelationStore::new()),
            &config,
            dyn_clock,
            codec,
            move |onboarding| {
                LocalCredentialAuthority::new(onboarding, authority_codec, authority_clock)
                    .with_hasher(cheap_hasher())
            },
        );
        (gate, clock)
    }

    fn setup() -> (Gate, Arc<ManualClock>) {
        setup_with(GateConfig {
            jwt_secret: "integration-secret".into(),
            operator_key: Some("operator".into()),
            ..GateConfig::default()
        })
    }

    async fn provision(gate: &Gate, slug: &str, owner_email: &str) -> ProvisionedTenant {
        gate.provisioner
            .provision_tenant(
                &Actor::Operator,
                ProvisionRequest {
                    name: format!("Tenant {slug}"),
                    slug: slug.into(),
                    owner_email: Some(owner_email.into()),
                },
            )
            .await
            .unwrap()
    }

    async fn signup(gate: &Gate, email: &str) -> Result<PrincipalId, GateError> {
        gate.credentials
            .create_identity(email, PASSWORD, SignupMetadata::default())
            .await
    }

    async fn sign_in(gate: &Gate, email: &str) -> IssuedToken {
        gate.sessions.sign_in(email, PASSWORD).await.unwrap()
    }

    async fn actor_for(gate: &Gate, token: &IssuedToken) -> Result<Actor, GateError> {
        gate.verifier
            .verify(token.access_token.as_str())
            .await
            .map(Actor::Member)
    }

    /// Provisioned tenant with an onboarded, signed-in owner.
    async fn owned_tenant(gate: &Gate, slug: &str) -> (ProvisionedTenant, Actor) {
        let owner_email = format!("owner@{slug}.io");
        let tenant = provision(gate, slug, &owner_email).await;
        signup(gate, &owner_email).await.unwrap();
        let token = sign_in(gate, &owner_email).await;
        (tenant, actor_for(gate, &token).await.unwrap())
    }

    fn invite(email: &str, role: RoleId) -> InvitationRequest {
        InvitationRequest {
            email: email.into(),
            target_role_id: role,
            tenant_id: None,
            invited_by: None,
        }
    }

    #[tokio::test]
    async fn end_to_end_provision_invite_onboard_and_claims() {
        let (gate, _) = setup();
        let tenant = provision(&gate, "tenant-a", "owner@a.io").await;
        signup(&gate, "owner@a.io").await.unwrap();
        let before = sign_in(&gate, "owner@a.io").await;
        let owner = actor_for(&gate, &before).await.unwrap();
        assert_eq!(before.claims.app_metadata.claims.role_id, tenant.owner_role_id);

        let manager = gate
            .hierarchy
            .create_role(
                &owner,
                NewRole {
                    name: "manager".into(),
                    permissions: vec!["users.invite".into()],
                    parent_role_id: None,
                },
            )
            .await
            .unwrap();
        gate.hierarchy
            .link_edge(&owner, tenant.owner_role_id, manager.id)
            .await
            .unwrap();

        let invitation = gate
            .invitations
            .create_invitation(&owner, invite("u@x.com", manager.id))
            .await
            .unwrap();

        let user = signup(&gate, "u@x.com").await.unwrap();
        let profile = stored_profile(&gate, user).await;
        assert_eq!(profile.role_id, manager.id);
        assert_eq!(profile.tenant_id, tenant.tenant_id);

        let stored = invitation_status(&gate, invitation.id).await;
        assert_eq!(stored, InvitationStatus::Accepted);

        // Issued before the edge: not live-patched.
        assert!(!before.claims.app_metadata.claims.descendants.contains(&manager.id));

        let after = sign_in(&gate, "owner@a.io").await;
        assert!(after.claims.app_metadata.claims.descendants.contains(&manager.id));
    }

    #[tokio::test]
    async fn cross_tenant_invite_never_lands_in_the_foreign_tenant() {
        let (gate, _) = setup();
        let (a, owner_a) = owned_tenant(&gate, "tenant-a").await;
        let (b, _) = owned_tenant(&gate, "tenant-b").await;

        let mut forged = invite("victim@x.com", b.owner_role_id);
        forged.tenant_id = Some(b.tenant_id);
        forged.invited_by = Some(PrincipalId::new());
        let err = gate
            .invitations
            .create_invitation(&owner_a, forged)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Forbidden(_)));

        // Targeting an own role while claiming tenant B is re-scoped to A.
        let mut rescoped = invite("victim@x.com", a.owner_role_id);
        rescoped.tenant_id = Some(b.tenant_id);
        let inv = gate
            .invitations
            .create_invitation(&owner_a, rescoped)
            .await
            .unwrap();
        assert_eq!(inv.tenant_id, a.tenant_id);

        let in_b = gate.store.invitations(b.tenant_id).await.unwrap();
        assert!(in_b.iter().all(|i| i.email.as_str() != "victim@x.com"));
    }

    #[tokio::test]
    async fn orphan_signup_creates_nothing() {
        let (gate, _) = setup();
        owned_tenant(&gate, "tenant-a").await;

        let err = signup(&gate, "stranger@x.com").await.unwrap_err();
        assert_eq!(err, GateError::NoPendingInvitation);
        assert_eq!(
            err.to_string(),
            "No pending invitation found for this email"
        );

        let err = gate
            .sessions
            .sign_in("stranger@x.com", PASSWORD)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::Auth(AuthError::InvalidCredentials));
        assert!(stored_profile_by_email(&gate, "stranger@x.com").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let (gate, _) = setup();
        provision(&gate, "tenant-a", "owner@a.io").await;
        let first = signup(&gate, "owner@a.io").await.unwrap();
        let profile = stored_profile(&gate, first).await;

        let err = gate
            .credentials
            .create_identity("OWNER@a.io", "another password", SignupMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::AlreadyOnboarded(_)), "{err:?}");

        // The original profile and credentials are untouched.
        assert_eq!(stored_profile(&gate, first).await, profile);
        assert_eq!(stored_profile_by_email(&gate, "owner@a.io").await, Some(profile));
        let token = sign_in(&gate, "owner@a.io").await;
        assert_eq!(token.claims.sub, first);
        let err = gate
            .sessions
            .sign_in("owner@a.io", "another password")
            .await
            .unwrap_err();
        assert_eq!(err, GateError::Auth(AuthError::InvalidCredentials));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_signups_create_one_identity() {
        let (gate, _) = setup();
        provision(&gate, "tenant-a", "rush@a.io").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let credentials = Arc::clone(&gate.credentials);
            handles.push(tokio::spawn(async move {
                credentials
                    .create_identity("rush@a.io", PASSWORD, SignupMetadata::default())
                    .await
            }));
        }

        let mut created = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(id) => created.push(id),
                Err(
                    GateError::NoPendingInvitation
                    | GateError::AlreadyOnboarded(_)
                    | GateError::Auth(AuthError::IdentityExists),
                ) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created.len(), 1);
        assert_eq!(sign_in(&gate, "rush@a.io").await.claims.sub, created[0]);
        assert_eq!(stored_profile(&gate, created[0]).await.email.as_str(), "rush@a.io");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_invitations_leave_exactly_one_pending() {
        let (gate, _) = setup();
        let (a, owner) = owned_tenant(&gate, "tenant-a").await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let invitations = Arc::clone(&gate.invitations);
            let owner = owner.clone();
            let role = a.owner_role_id;
            handles.push(tokio::spawn(async move {
                invitations
                    .create_invitation(&owner, invite("race@x.com", role))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(GateError::DuplicateInvitation(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);

        let pending = gate
            .store
            .pending_invitations(&Email::parse("race@x.com").unwrap())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_onboarding_consumes_the_invitation_once() {
        let (gate, _) = setup();
        let (a, owner) = owned_tenant(&gate, "tenant-a").await;
        gate.invitations
            .create_invitation(&owner, invite("twice@x.com", a.owner_role_id))
            .await
            .unwrap();

        let email = Email::parse("twice@x.com").unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let onboarding = Arc::clone(&gate.onboarding);
            let email = email.clone();
            handles.push(tokio::spawn(async move {
                onboarding
                    .admit(PrincipalId::new(), &email, SignupMetadata::default())
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(GateError::NoPendingInvitation | GateError::AlreadyOnboarded(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert!(stored_profile_by_email(&gate, "twice@x.com").await.is_some());
    }

    #[tokio::test]
    async fn reissue_policy_keeps_old_tokens_valid_but_stale() {
        let (gate, _) = setup();
        let (a, owner) = owned_tenant(&gate, "tenant-a").await;
        let old = sign_in(&gate, "owner@tenant-a.io").await;

        let role = gate
            .hierarchy
            .create_role(
                &owner,
                NewRole {
                    name: "staff".into(),
                    permissions: vec![],
                    parent_role_id: Some(a.owner_role_id),
                },
            )
            .await
            .unwrap();

        let still_valid = actor_for(&gate, &old).await.unwrap();
        let claims = &still_valid.as_member().unwrap().claims;
        assert!(!claims.descendants.contains(&role.id));
    }

    #[tokio::test]
    async fn revoke_policy_rejects_tokens_older_than_the_hierarchy() {
        let (gate, _) = setup_with(GateConfig {
            claims_refresh: ClaimsRefreshPolicy::RevokeOnHierarchyChange,
            ..GateConfig::default()
        });
        let (a, owner) = owned_tenant(&gate, "tenant-a").await;
        let old = sign_in(&gate, "owner@tenant-a.io").await;

        gate.hierarchy
            .create_role(
                &owner,
                NewRole {
                    name: "staff".into(),
                    permissions: vec![],
                    parent_role_id: Some(a.owner_role_id),
                },
            )
            .await
            .unwrap();

        let err = actor_for(&gate, &old).await.unwrap_err();
        assert_eq!(err, GateError::Auth(AuthError::StaleCredential));

        let fresh = sign_in(&gate, "owner@tenant-a.io").await;
        assert!(actor_for(&gate, &fresh).await.is_ok());
    }

    #[tokio::test]
    async fn expired_invitation_cannot_be_used_for_signup() {
        let (gate, clock) = setup_with(GateConfig {
            invitation_ttl: Some(Duration::hours(72)),
            ..GateConfig::default()
        });
        let tenant = provision(&gate, "tenant-a", "late@a.io").await;

        clock.advance(Duration::hours(73));
        let err = signup(&gate, "late@a.io").await.unwrap_err();
        assert_eq!(err, GateError::NoPendingInvitation);

        let status = invitation_status(&gate, tenant.owner_invitation_id.unwrap()).await;
        assert_eq!(status, InvitationStatus::Expired);
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let (gate, clock) = setup();
        owned_tenant(&gate, "tenant-a").await;
        let token = sign_in(&gate, "owner@tenant-a.io").await;

        clock.advance(Duration::hours(2));
        let err = actor_for(&gate, &token).await.unwrap_err();
        assert_eq!(err, GateError::Auth(AuthError::Expired));
    }

    async fn stored_profile(gate: &Gate, id: PrincipalId) -> Profile {
        gate.store.profile(id).await.unwrap().unwrap()
    }

    async fn stored_profile_by_email(gate: &Gate, email: &str) -> Option<Profile> {
        gate.store
            .profile_by_email(&Email::parse(email).unwrap())
            .await
            .unwrap()
    }

    async fn invitation_status(gate: &Gate, id: InvitationId) -> InvitationStatus {
        gate.store.invitation(id).await.unwrap().unwrap().status
    }
}
