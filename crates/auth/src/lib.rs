//! `tenantgate-auth`: pure authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod hierarchy;
pub mod permissions;
pub mod principal;
pub mod token;

pub use authorize::{
    AuthzError, TenantRoot, authorize_grant, authorize_role, authorize_tenant, is_owner,
    require_member, require_operator,
};
pub use claims::{AccessTokenClaims, AppMetadata, ClaimsSet, validate_claims};
pub use error::AuthError;
pub use hierarchy::RoleGraph;
pub use permissions::Permission;
pub use principal::{Actor, Principal, PrincipalId};
pub use token::{Hs256TokenCodec, JwtValidator, SignedToken};
