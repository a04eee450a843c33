//! Runtime configuration, read from the environment.

use std::net::SocketAddr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::EmailScope;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;
const MAX_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600;
const MAX_INVITATION_TTL_HOURS: i64 = 365 * 24;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// What happens to already-issued tokens when a tenant's hierarchy changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimsRefreshPolicy {
    /// Tokens stay valid until they expire; changes show up on re-issuance.
    #[default]
    Reissue,
    /// Tokens minted before the latest hierarchy change are rejected.
    RevokeOnHierarchyChange,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct GateConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    /// Bearer secret identifying the system operator. `None` disables provisioning.
    pub operator_key: Option<String>,
    pub invitation_ttl: Option<Duration>,
    pub claims_refresh: ClaimsRefreshPolicy,
    pub email_scope: EmailScope,
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
}

impl core::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GateConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("operator_key", &self.operator_key.as_ref().map(|_| "<redacted>"))
            .field("invitation_ttl", &self.invitation_ttl)
            .field("claims_refresh", &self.claims_refresh)
            .field("email_scope", &self.email_scope)
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
            operator_key: None,
            invitation_ttl: None,
            claims_refresh: ClaimsRefreshPolicy::default(),
            email_scope: EmailScope::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let token_ttl = match get("TOKEN_TTL_SECONDS") {
            Some(raw) => {
                let secs: i64 = raw
                    .parse()
                    .map_err(|_| ConfigError::invalid("TOKEN_TTL_SECONDS", "not an integer"))?;
                if secs <= 0 || secs > MAX_TOKEN_TTL_SECONDS {
                    return Err(ConfigError::invalid(
                        "TOKEN_TTL_SECONDS",
                        format!("must be between 1 and {MAX_TOKEN_TTL_SECONDS}"),
                    ));
                }
                Duration::try_seconds(secs)
                    .ok_or_else(|| ConfigError::invalid("TOKEN_TTL_SECONDS", "out of range"))?
            }
            None => Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
        };

        let invitation_ttl = match get("INVITATION_TTL_HOURS") {
            Some(raw) => {
                let hours: i64 = raw
                    .parse()
                    .map_err(|_| ConfigError::invalid("INVITATION_TTL_HOURS", "not an integer"))?;
                if hours <= 0 || hours > MAX_INVITATION_TTL_HOURS {
                    return Err(ConfigError::invalid(
                        "INVITATION_TTL_HOURS",
                        format!("must be between 1 and {MAX_INVITATION_TTL_HOURS}"),
                    ));
                }
                Some(
                    Duration::try_hours(hours)
                        .ok_or_else(|| ConfigError::invalid("INVITATION_TTL_HOURS", "out of range"))?,
                )
            }
            None => None,
        };

        let claims_refresh = match get("CLAIMS_REFRESH_POLICY").as_deref() {
            None | Some("reissue") => ClaimsRefreshPolicy::Reissue,
            Some("revoke_on_hierarchy_change") => ClaimsRefreshPolicy::RevokeOnHierarchyChange,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "CLAIMS_REFRESH_POLICY",
                    format!("unknown policy '{other}'"),
                ));
            }
        };

        let email_scope = match get("EMAIL_SCOPE").as_deref() {
            None | Some("global") => EmailScope::Global,
            Some("tenant") => EmailScope::Tenant,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "EMAIL_SCOPE",
                    format!("unknown scope '{other}'"),
                ));
            }
        };

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|_| ConfigError::invalid("BIND_ADDR", "not a socket address"))?;

        let operator_key = get("OPERATOR_KEY");
        if operator_key.is_none() {
            tracing::info!("OPERATOR_KEY not set; tenant provisioning is disabled");
        }

        Ok(Self {
            jwt_secret,
            token_ttl,
            operator_key,
            invitation_ttl,
            claims_refresh,
            email_scope,
            bind_addr,
            database_url: get("DATABASE_URL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = GateConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.token_ttl, Duration::seconds(3600));
        assert_eq!(cfg.claims_refresh, ClaimsRefreshPolicy::Reissue);
        assert_eq!(cfg.email_scope, EmailScope::Global);
        assert_eq!(cfg.invitation_ttl, None);
        assert_eq!(cfg.operator_key, None);
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn explicit_values_are_parsed() {
        let cfg = GateConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_SECONDS", "60"),
            ("OPERATOR_KEY", "op"),
            ("INVITATION_TTL_HOURS", "48"),
            ("CLAIMS_REFRESH_POLICY", "revoke_on_hierarchy_change"),
            ("EMAIL_SCOPE", "tenant"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.token_ttl, Duration::seconds(60));
        assert_eq!(cfg.operator_key.as_deref(), Some("op"));
        assert_eq!(cfg.invitation_ttl, Some(Duration::hours(48)));
        assert_eq!(cfg.claims_refresh, ClaimsRefreshPolicy::RevokeOnHierarchyChange);
        assert_eq!(cfg.email_scope, EmailScope::Tenant);
        assert_eq!(cfg.bind_addr.port(), 9000);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = GateConfig::from_lookup(lookup(&[("EMAIL_SCOPE", "planet")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "EMAIL_SCOPE", .. }));

        let err = GateConfig::from_lookup(lookup(&[("TOKEN_TTL_SECONDS", "-5")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "TOKEN_TTL_SECONDS", .. }));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        for (var, raw) in [
            ("TOKEN_TTL_SECONDS", "1000000000000000"),
            ("TOKEN_TTL_SECONDS", "2592001"),
            ("INVITATION_TTL_HOURS", "9223372036854775807"),
            ("INVITATION_TTL_HOURS", "8761"),
        ] {
            let err = GateConfig::from_lookup(lookup(&[(var, raw)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var: v, .. } if v == var),
                "{var}={raw}: {err:?}"
            );
        }

        let cfg = GateConfig::from_lookup(lookup(&[("INVITATION_TTL_HOURS", "8760")])).unwrap();
        assert_eq!(cfg.invitation_ttl, Some(Duration::hours(8760)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = GateConfig::from_lookup(lookup(&[("JWT_SECRET", "topsecret"), ("OPERATOR_KEY", "opkey")])).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("opkey"));
    }
}
