//! HS256 access-token codec.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{AccessTokenClaims, AppMetadata, AuthError, ClaimsSet, PrincipalId, validate_claims};

/// An encoded, signed access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedToken(String);

impl SignedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SignedToken(<redacted>)")
    }
}

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessTokenClaims, AuthError>;
}

/// Symmetric (HS256) signer/verifier for access tokens.
#[derive(Clone)]
pub struct Hs256TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl core::fmt::Debug for Hs256TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Hs256TokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token embedding `claims` for `sub`, valid from `now` for the configured ttl.
    pub fn mint(
        &self,
        sub: PrincipalId,
        claims: &ClaimsSet,
        hierarchy_version: u64,
        now: DateTime<Utc>,
    ) -> Result<(SignedToken, AccessTokenClaims), AuthError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::Signing("token expiry is out of range".into()))?;
        let body = AccessTokenClaims {
            sub,
            app_metadata: AppMetadata {
                claims: claims.clone(),
                hierarchy_version,
            },
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &body, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok((SignedToken(token), body))
    }
}

impl JwtValidator for Hs256TokenCodec {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessTokenClaims, AuthError> {
        // Time checks run against the injected clock below, not the library's.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
