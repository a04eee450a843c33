//! Invitation Manager: tenant-forced invitation creation and pending lookup.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tenantgate_auth::{Actor, PrincipalId, authorize_role, require_member};
use tenantgate_core::{RoleId, TenantId};
use tenantgate_tenancy::{Email, Invitation, Slug};

use crate::clock::Clock;
use crate::error::GateError;
use crate::scope::ScopedStore;
use crate::store::{EmailScope, RelationStore, StoreError};

/// Invitation request as received from a caller.
///
/// `tenant_id` and `invited_by` are accepted but never trusted; the
/// persisted values always come from the caller's verified claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRequest {
    pub email: String,
    pub target_role_id: RoleId,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub invited_by: Option<PrincipalId>,
}

pub struct InvitationManager<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: Option<Duration>,
    email_scope: EmailScope,
}

impl<S> InvitationManager<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        ttl: Option<Duration>,
        email_scope: EmailScope,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            email_scope,
        }
    }

    pub fn email_scope(&self) -> EmailScope {
        self.email_scope
    }

    #[instrument(skip(self, actor, request), fields(target_role_id = %request.target_role_id), err)]
    pub async fn create_invitation(
        &self,
        actor: &Actor,
        request: InvitationRequest,
    ) -> Result<Invitation, GateError> {
        let principal = require_member(actor)?;
        let tenant_id = principal.tenant_id();

        if request.tenant_id.is_some_and(|supplied| supplied != tenant_id) {
            warn!(
                caller_tenant = %tenant_id,
                "ignoring client-supplied tenant_id on invitation"
            );
        }
        if request.invited_by.is_some_and(|supplied| supplied != principal.id) {
            warn!(caller = %principal.id, "ignoring client-supplied invited_by on invitation");
        }

        let email = Email::parse(&request.email)?;
        let scoped = ScopedStore::for_actor(&*self.store, actor);

        let tenant = scoped
            .tenant(tenant_id)
            .await?
            .ok_or_else(|| GateError::Forbidden("the caller's tenant does not exist".into()))?;
        if scoped.role(request.target_role_id).await?.is_none() {
            return Err(GateError::Forbidden(format!(
                "role {} is not part of the caller's tenant",
                request.target_role_id
            )));
        }
        authorize_role(principal, &tenant.root(), request.target_role_id)?;

        if self.store.profile_by_email(&email).await?.is_some() {
            return Err(GateError::AlreadyOnboarded(format!(
                "{email} is already a member of a tenant"
            )));
        }

        // Free the uniqueness slot held by a lapsed invitation.
        self.expire_due(&email).await?;

        let invitation = Invitation::issue(
            tenant_id,
            email,
            request.target_role_id,
            Some(principal.id),
            self.clock.now(),
            self.ttl,
        )?;

        scoped
            .insert_invitation(&invitation, self.email_scope)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => {
                    GateError::DuplicateInvitation(invitation.email.to_string())
                }
                other => other.into(),
            })?;

        info!(
            tenant_id = %invitation.tenant_id,
            invitation_id = %invitation.id,
            target_role_id = %invitation.target_role_id,
            invited_by = %principal.id,
            "invitation created"
        );
        Ok(invitation)
    }

    /// Expire every Pending invitation for `email` whose deadline has passed.
    pub(crate) async fn expire_due(&self, email: &Email) -> Result<Vec<Invitation>, GateError> {
        let now = self.clock.now();
        let mut live = Vec::new();
        for inv in self.store.pending_invitations(email).await? {
            if !inv.is_due(now) {
                live.push(inv);
                continue;
            }
            match self.store.expire_invitation(inv.id).await {
                Ok(expired) => {
                    info!(tenant_id = %expired.tenant_id, invitation_id = %expired.id, "invitation expired");
                }
                // Someone else already moved it out of Pending.
                Err(StoreError::Conflict(_)) => {
                    debug!(invitation_id = %inv.id, "invitation already left pending");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(live)
    }

    /// The single live Pending invitation for `email`, if any.
    ///
    /// Fails closed when more than one tenant holds a Pending invitation for
    /// the email (only possible with [`EmailScope::Tenant`]).
    pub async fn resolve_pending(&self, email: &Email) -> Result<Option<Invitation>, GateError> {
        self.resolve_pending_in(email, None).await
    }

    /// Like [`Self::resolve_pending`], narrowed to one tenant when a slug is given.
    #[instrument(skip(self, email, tenant_hint), err)]
    pub async fn resolve_pending_in(
        &self,
        email: &Email,
        tenant_hint: Option<&Slug>,
    ) -> Result<Option<Invitation>, GateError> {
        let mut live = self.expire_due(email).await?;

        if let Some(slug) = tenant_hint {
            let Some(tenant) = self.store.tenant_by_slug(slug).await? else {
                return Ok(None);
            };
            live.retain(|inv| inv.tenant_id == tenant.id);
        }

        match live.len() {
            0 => Ok(None),
            1 => Ok(live.pop()),
            n => {
                warn!(candidates = n, "ambiguous pending invitations; tenant slug required");
                Ok(None)
            }
        }
    }

    pub async fn list_invitations(&self, actor: &Actor) -> Result<Vec<Invitation>, GateError> {
        let principal = require_member(actor)?;
        Ok(ScopedStore::for_actor(&*self.store, actor)
            .invitations(principal.tenant_id())
            .await?)
    }
}
