//! Onboarding Gate: the invitation check that runs before an identity exists.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use tenantgate_auth::PrincipalId;
use tenantgate_tenancy::{Email, Profile, ProfileMetadata, Slug};

use crate::clock::Clock;
use crate::error::GateError;
use crate::invitations::InvitationManager;
use crate::store::{Constraint, RelationStore, StoreError};

/// Metadata supplied with a signup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupMetadata {
    #[serde(flatten)]
    pub profile: ProfileMetadata,
    /// Disambiguates when several tenants invited the same email.
    #[serde(default)]
    pub tenant_slug: Option<String>,
}

pub struct OnboardingGate<S: ?Sized> {
    store: Arc<S>,
    invitations: Arc<InvitationManager<S>>,
    clock: Arc<dyn Clock>,
}

impl<S> OnboardingGate<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(store: Arc<S>, invitations: Arc<InvitationManager<S>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            invitations,
            clock,
        }
    }

    /// Admit `principal` into the tenant that invited `email`.
    ///
    /// On success the profile exists and the invitation is Accepted; on any
    /// failure neither changed.
    #[instrument(skip(self, email, metadata), err)]
    pub async fn admit(
        &self,
        principal: PrincipalId,
        email: &Email,
        metadata: SignupMetadata,
    ) -> Result<Profile, GateError> {
        if self.store.profile(principal).await?.is_some()
            || self.store.profile_by_email(email).await?.is_some()
        {
            return Err(GateError::AlreadyOnboarded(format!(
                "{email} is already a member of a tenant"
            )));
        }

        let hint = metadata
            .tenant_slug
            .as_deref()
            .map(Slug::parse)
            .transpose()?;

        let Some(invitation) = self
            .invitations
            .resolve_pending_in(email, hint.as_ref())
            .await?
        else {
            warn!("onboarding rejected: no pending invitation");
            return Err(GateError::NoPendingInvitation);
        };

        let profile = Profile::from_invitation(principal, &invitation, metadata.profile);
        self.store
            .accept_invitation(invitation.id, &profile, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) | StoreError::NotFound(_) => GateError::NoPendingInvitation,
                StoreError::UniqueViolation(Constraint::ProfileId | Constraint::ProfileEmail) => {
                    GateError::AlreadyOnboarded(format!("{email} is already a member of a tenant"))
                }
                other => other.into(),
            })?;

        info!(
            tenant_id = %profile.tenant_id,
            role_id = %profile.role_id,
            invitation_id = %invitation.id,
            "invitation accepted; profile created"
        );
        Ok(profile)
    }

    /// Whether `email` could be admitted right now, without side effects
    /// beyond lazily expiring lapsed invitations.
    pub async fn precheck(&self, email: &Email, metadata: &SignupMetadata) -> Result<(), GateError> {
        if self.store.profile_by_email(email).await?.is_some() {
            return Err(GateError::AlreadyOnboarded(format!(
                "{email} is already a member of a tenant"
            )));
        }
        let hint = metadata
            .tenant_slug
            .as_deref()
            .map(Slug::parse)
            .transpose()?;
        match self.invitations.resolve_pending_in(email, hint.as_ref()).await? {
            Some(_) => Ok(()),
            None => Err(GateError::NoPendingInvitation),
        }
    }
}
