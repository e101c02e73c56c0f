//! Per-browser session state.
//!
//! The raw session token only ever travels in the cookie. Stores are keyed by
//! the SHA-256 hash of the token (`SessionKey`), so a leaked table never
//! yields usable cookies.
//!
//! Session contents are a typed `SessionData` record: the authenticated
//! officer, the pending one-time-code challenge and the report wizard state.
//! Each browser owns exactly one record and nothing reads across sessions.

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, time::Duration};
use uuid::Uuid;

use crate::{auth::otp::OtpChallenge, wizard::WizardState, BoxFuture};

const TOKEN_BYTES: usize = 32;

/// Raw session token as carried by the browser cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Create a new random token.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session token")?;
        Ok(Self(Base64UrlUnpadded::encode_string(&bytes)))
    }

    /// Accept a cookie value only if it has the shape of a token we issued.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let decoded = Base64UrlUnpadded::decode_vec(trimmed).ok()?;
        if decoded.len() == TOKEN_BYTES {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key derived from the token.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        SessionKey(hasher.finalize().to_vec())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Hashed token used as the store key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Everything the portal keeps for one browser between requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Set once the one-time code has been verified.
    #[serde(default)]
    pub officer_id: Option<Uuid>,
    /// Outstanding one-time-code challenge, at most one per session.
    #[serde(default)]
    pub challenge: Option<OtpChallenge>,
    /// Report wizard progress.
    #[serde(default)]
    pub wizard: Option<WizardState>,
}

impl SessionData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.officer_id.is_none() && self.challenge.is_none() && self.wizard.is_none()
    }
}

/// Key-value storage for session records with expiry.
pub trait SessionStore: Send + Sync {
    /// Load a live session; expired or unknown keys resolve to `None`.
    fn load<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<Option<SessionData>>>;

    /// Insert or replace a session and push its expiry `ttl` into the future.
    fn save<'a>(
        &'a self,
        key: &'a SessionKey,
        data: &'a SessionData,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>>;

    fn delete<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<()>>;
}
