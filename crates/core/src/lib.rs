//! `tenantgate-core`: identifiers and domain errors shared by every layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{InvitationId, RoleId, TenantId};
