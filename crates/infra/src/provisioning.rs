//! Tenant Provisioner: operator-only creation of a tenant and its owner role.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use tenantgate_auth::{Actor, require_operator};
use tenantgate_core::{InvitationId, RoleId, TenantId};
use tenantgate_tenancy::{Email, Invitation, Role, Slug, Tenant};

use crate::clock::Clock;
use crate::error::GateError;
use crate::invitations::InvitationManager;
use crate::store::{EmailScope, RelationStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub name: String,
    pub slug: String,
    /// When set, a Pending owner invitation is committed with the tenant.
    #[serde(default)]
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedTenant {
    pub tenant_id: TenantId,
    pub owner_role_id: RoleId,
    pub owner_invitation_id: Option<InvitationId>,
}

pub struct TenantProvisioner<S: ?Sized> {
    store: Arc<S>,
    invitations: Arc<InvitationManager<S>>,
    clock: Arc<dyn Clock>,
    invitation_ttl: Option<Duration>,
    email_scope: EmailScope,
}

impl<S> TenantProvisioner<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        invitations: Arc<InvitationManager<S>>,
        clock: Arc<dyn Clock>,
        invitation_ttl: Option<Duration>,
        email_scope: EmailScope,
    ) -> Self {
        Self {
            store,
            invitations,
            clock,
            invitation_ttl,
            email_scope,
        }
    }

    #[instrument(skip(self, actor, request), fields(slug = %request.slug), err)]
    pub async fn provision_tenant(
        &self,
        actor: &Actor,
        request: ProvisionRequest,
    ) -> Result<ProvisionedTenant, GateError> {
        require_operator(actor)?;

        let slug = Slug::parse(&request.slug)?;
        let owner_email = request
            .owner_email
            .as_deref()
            .map(Email::parse)
            .transpose()?;

        if let Some(email) = &owner_email {
            if self.store.profile_by_email(email).await?.is_some() {
                return Err(GateError::AlreadyOnboarded(format!(
                    "{} is already a member of a tenant",
                    email.as_str()
                )));
            }
            // A lapsed owner invitation must not hold the pending slot.
            self.invitations.expire_due(email).await?;
        }

        let now = self.clock.now();
        let tenant = Tenant::provision(&request.name, slug, RoleId::new(), now)?;
        let owner_role = Role::owner_of(&tenant);
        let owner_invitation = owner_email
            .map(|email| {
                Invitation::issue(tenant.id, email, owner_role.id, None, now, self.invitation_ttl)
            })
            .transpose()?;

        self.store
            .insert_tenant(&tenant, &owner_role, owner_invitation.as_ref(), self.email_scope)
            .await
            .map_err(|e| match GateError::from(e) {
                GateError::DuplicateSlug(_) => GateError::DuplicateSlug(tenant.slug.as_str().to_string()),
                other => other,
            })?;

        info!(
            tenant_id = %tenant.id,
            owner_role_id = %owner_role.id,
            owner_invited = owner_invitation.is_some(),
            "tenant provisioned"
        );

        Ok(ProvisionedTenant {
            tenant_id: tenant.id,
            owner_role_id: owner_role.id,
            owner_invitation_id: owner_invitation.map(|inv| inv.id),
        })
    }
}
