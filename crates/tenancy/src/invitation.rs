//! Invitation lifecycle.
//!
//! `Pending -> Accepted` on successful onboarding, `Pending -> Expired` once the
//! deadline passes. Terminal states never change again.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tenantgate_auth::PrincipalId;
use tenantgate_core::{DomainError, InvitationId, RoleId, TenantId};

use crate::Email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InvitationStatus::Pending),
            "accepted" => Some(InvitationStatus::Accepted),
            "expired" => Some(InvitationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

impl core::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending authorization for one email to join a tenant under one role.
///
/// # Invariants
/// - `tenant_id` and `invited_by` come from the inviter's verified claims.
/// - `target_role_id` belongs to `tenant_id`.
/// - Status only moves out of `Pending`, never back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub tenant_id: TenantId,
    pub email: Email,
    pub target_role_id: RoleId,
    /// `None` when issued by the operator during provisioning.
    pub invited_by: Option<PrincipalId>,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn issue(
        tenant_id: TenantId,
        email: Email,
        target_role_id: RoleId,
        invited_by: Option<PrincipalId>,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Result<Self, DomainError> {
        let expires_at = match ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                DomainError::validation("invitation expiry is out of range")
            })?),
            None => None,
        };
        Ok(Self {
            id: InvitationId::new(),
            tenant_id,
            email,
            target_role_id,
            invited_by,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at,
            accepted_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    /// Pending, but past its deadline.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::invariant(format!(
                "invitation is {}, not pending",
                self.status
            )));
        }
        if self.is_due(now) {
            return Err(DomainError::invariant("invitation has expired"));
        }
        self.status = InvitationStatus::Accepted;
        self.accepted_at = Some(now);
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::invariant(format!(
                "invitation is {}, not pending",
                self.status
            )));
        }
        self.status = InvitationStatus::Expired;
        Ok(())
    }
}
