//! Officer identity: credential checks, principal lookup and the one-time-code gate.
//!
//! Flow Overview:
//! 1) `OfficerDirectory::authenticate` checks station ID + password.
//! 2) `otp::ChallengeIssuer::issue_challenge` installs a six-digit code in the
//!    session and delivers it out of band.
//! 3) `otp::ChallengeIssuer::verify_challenge` consumes the code and resolves the
//!    principal, after which the HTTP layer marks the session authenticated.

pub mod otp;
mod postgres;

pub use postgres::{hash_password, PgOfficerDirectory};

use anyhow::Result;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::BoxFuture;

/// Police station (command). Every non-superuser officer belongs to exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Station {
    pub id: Uuid,
    pub name: String,
    pub location: String,
}

/// Authenticated officer as seen by handlers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Principal {
    pub officer_id: Uuid,
    /// Station ID used to sign in.
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub station: Option<Station>,
    pub is_superuser: bool,
}

/// Officer credentials and identity lookups.
pub trait OfficerDirectory: Send + Sync {
    /// Resolves the officer only when the username exists, the account is
    /// active and the password matches. Every other outcome is `None`.
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Option<Principal>>>;

    fn lookup(&self, officer_id: Uuid) -> BoxFuture<'_, Result<Option<Principal>>>;

    /// Email addresses of the active officers attached to a station.
    fn station_contacts(&self, station_id: Uuid) -> BoxFuture<'_, Result<Vec<String>>>;

    /// All stations, ordered by name.
    fn stations(&self) -> BoxFuture<'_, Result<Vec<Station>>>;

    fn station(&self, station_id: Uuid) -> BoxFuture<'_, Result<Option<Station>>>;
}
