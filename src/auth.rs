//! Auth provider (component C): supply a bearer credential per connection,
//! refresh on expiry.
//!
//! Grounded on the `async_trait` pluggable-capability pattern used
//! throughout the teacher repo (e.g. `OpenRouterClient::from_keyring`
//! construction, and the `SmartTurnClassifier` trait in `turn/smart.rs`
//! follows the same shape). Token minting/refresh-over-HTTP is explicitly
//! out of scope (§1) — a caller needing custom refresh logic implements
//! this trait.

use std::env;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::RtError;

/// Environment variable read for a bearer credential when none is given
/// explicitly (§6).
pub const API_KEY_ENV_VAR: &str = "SPEECHMATICS_API_KEY";

/// A bearer credential, with an optional expiry after which it must be
/// refetched before the next `connect()`.
#[derive(Debug, Clone)]
pub struct BearerCredential {
    pub token: String,
    pub expires_at: Option<Instant>,
}

impl BearerCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Supplies a bearer credential for each `connect()`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return the credential to use for the next connection attempt,
    /// refreshing it first if the previously issued one has expired.
    async fn credential(&self) -> Result<BearerCredential, RtError>;
}

/// A fixed or environment-sourced bearer token. Never expires (no
/// refresh-over-HTTP is implemented — see module docs).
pub struct StaticAuthProvider {
    token: String,
}

impl StaticAuthProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the credential from `SPEECHMATICS_API_KEY`.
    pub fn from_env() -> Result<Self, RtError> {
        let token = env::var(API_KEY_ENV_VAR)
            .map_err(|_| RtError::Auth(format!("{API_KEY_ENV_VAR} is not set")))?;
        Ok(Self::new(token))
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn credential(&self) -> Result<BearerCredential, RtError> {
        Ok(BearerCredential::new(self.token.clone()))
    }
}
