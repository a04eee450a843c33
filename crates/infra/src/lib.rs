//! Infrastructure layer: relation store adapters, the onboarding and
//! authorization services built on them, credentials and configuration.

pub mod claims;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gatekeeper;
pub mod hierarchy;
pub mod invitations;
pub mod onboarding;
pub mod provisioning;
pub mod scope;
pub mod sessions;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use claims::ClaimsIssuer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClaimsRefreshPolicy, ConfigError, GateConfig};
pub use credentials::{CredentialAuthority, IssuedToken, LocalCredentialAuthority};
pub use error::GateError;
pub use gatekeeper::Gatekeeper;
pub use hierarchy::{NewRole, RoleHierarchyStore};
pub use invitations::{InvitationManager, InvitationRequest};
pub use onboarding::{OnboardingGate, SignupMetadata};
pub use provisioning::{ProvisionRequest, ProvisionedTenant, TenantProvisioner};
pub use scope::{Scope, ScopedStore};
pub use sessions::{CredentialVerifier, SessionIssuer};
pub use store::{Constraint, EmailScope, InMemoryRelationStore, RelationStore, StoreError};
#[cfg(feature = "postgres")]
pub use store::PostgresRelationStore;
