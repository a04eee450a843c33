//! Tenancy domain module.
//!
//! Tenants, roles, hierarchy edges, invitations and member profiles,
//! implemented as deterministic domain logic (no IO, no HTTP, no storage).

pub mod email;
pub mod invitation;
pub mod profile;
pub mod role;
pub mod tenant;

pub use email::Email;
pub use invitation::{Invitation, InvitationStatus};
pub use profile::{Profile, ProfileMetadata};
pub use role::{HierarchyEdge, Role};
pub use tenant::{Slug, Tenant};
