//! Credential Authority boundary and a local reference implementation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use rand_core::OsRng;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use tenantgate_auth::{AccessTokenClaims, AuthError, ClaimsSet, Hs256TokenCodec, PrincipalId, SignedToken};
use tenantgate_tenancy::Email;

use crate::clock::Clock;
use crate::error::GateError;
use crate::onboarding::{OnboardingGate, SignupMetadata};
use crate::store::RelationStore;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: SignedToken,
    pub claims: AccessTokenClaims,
}

#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    /// Fails with `InvalidCredentials` without saying which half was wrong.
    async fn authenticate(&self, email: &str, secret: &str) -> Result<PrincipalId, AuthError>;

    async fn issue_token(
        &self,
        principal: PrincipalId,
        claims: &ClaimsSet,
        hierarchy_version: u64,
    ) -> Result<IssuedToken, AuthError>;

    /// Create an identity, gated by onboarding: a rejected signup leaves no identity.
    async fn create_identity(
        &self,
        email: &str,
        secret: &str,
        metadata: SignupMetadata,
    ) -> Result<PrincipalId, GateError>;
}

#[derive(Debug, Clone)]
struct Identity {
    principal_id: PrincipalId,
    password_hash: String,
}

/// In-process identities with argon2 password hashes and HS256 tokens.
pub struct LocalCredentialAuthority<S: ?Sized> {
    identities: Mutex<HashMap<Email, Identity>>,
    hasher: Argon2<'static>,
    codec: Arc<Hs256TokenCodec>,
    gate: Arc<OnboardingGate<S>>,
    clock: Arc<dyn Clock>,
}

impl<S> LocalCredentialAuthority<S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(gate: Arc<OnboardingGate<S>>, codec: Arc<Hs256TokenCodec>, clock: Arc<dyn Clock>) -> Self {
        Self {
            identities: Mutex::new(HashMap::new()),
            hasher: Argon2::default(),
            codec,
            gate,
            clock,
        }
    }

    /// Replace the password hasher (e.g. cheaper parameters in tests).
    pub fn with_hasher(mut self, hasher: Argon2<'static>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Argon2 is CPU-bound; run it off the async workers.
    async fn hash_password(&self, secret: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
    }

    fn verify_password(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.hasher.verify_password(secret.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl<S> CredentialAuthority for LocalCredentialAuthority<S>
where
    S: RelationStore + ?Sized,
{
    async fn authenticate(&self, email: &str, secret: &str) -> Result<PrincipalId, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;
        let identity = self
            .identities
            .lock()
            .await
            .get(&email)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        if self.verify_password(secret, &identity.password_hash) {
            Ok(identity.principal_id)
        } else {
            warn!(principal_id = %identity.principal_id, "password verification failed");
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn issue_token(
        &self,
        principal: PrincipalId,
        claims: &ClaimsSet,
        hierarchy_version: u64,
    ) -> Result<IssuedToken, AuthError> {
        let (access_token, claims) = self
            .codec
            .mint(principal, claims, hierarchy_version, self.clock.now())?;
        Ok(IssuedToken {
            access_token,
            claims,
        })
    }

    #[instrument(skip(self, email, secret, metadata), err)]
    async fn create_identity(
        &self,
        email: &str,
        secret: &str,
        metadata: SignupMetadata,
    ) -> Result<PrincipalId, GateError> {
        let email = Email::parse(email)?;
        if secret.chars().count() < MIN_PASSWORD_LEN {
            return Err(GateError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        // An onboarded email is reported as such before the identity map is consulted.
        self.gate.precheck(&email, &metadata).await?;
        if self.identities.lock().await.contains_key(&email) {
            return Err(AuthError::IdentityExists.into());
        }

        let password_hash = self.hash_password(secret).await?;

        // Concurrent signups for one email race in the store; profile-email
        // uniqueness and the invitation compare-and-set admit exactly one.
        let principal_id = PrincipalId::new();
        self.gate.admit(principal_id, &email, metadata).await?;

        match self.identities.lock().await.entry(email) {
            Entry::Occupied(_) => return Err(AuthError::IdentityExists.into()),
            Entry::Vacant(slot) => {
                slot.insert(Identity {
                    principal_id,
                    password_hash,
                });
            }
        }
        info!(principal_id = %principal_id, "identity created");
        Ok(principal_id)
    }
}
