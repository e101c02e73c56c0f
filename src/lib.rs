//! # SafeIMEI (Stolen Device Reporting Portal)
//!
//! `safeimei` runs the public IMEI lookup and report intake flow together with
//! the authenticated officer back-office: dashboard, report review and the
//! multi-step report wizard.
//!
//! ## Officer Authentication
//!
//! Officers sign in with their station ID and password and then confirm a
//! six-digit one-time code delivered by email or SMS. The code lives in the
//! browser session, is single-use, and is replaced by any newer login attempt.
//!
//! ## Report Wizard
//!
//! Reports are captured over four steps. Validated fields accumulate in the
//! session and nothing is persisted until the last step commits. A failed
//! commit (for example a duplicate IMEI) keeps the accumulated steps so only
//! the final step has to be resubmitted.
//!
//! ## Report Lifecycle
//!
//! - Officer reports start as `Stolen` and are visible to the public lookup.
//! - Self-service public reports start as `Payment Pending` and move to
//!   `Pending` exactly once when the payment callback is confirmed.
//! - Officers of the owning station review reports (`approve`, `reject`,
//!   `mark_recovered`, `mark_stolen`). Reports of other stations answer
//!   `404 Not Found` rather than `403 Forbidden` to avoid enumeration.

pub mod api;
pub mod auth;
pub mod cli;
pub mod geo;
pub mod lookup;
pub mod notify;
pub mod report;
pub mod seed;
pub mod session;
pub mod wizard;

#[cfg(test)]
pub(crate) mod test_support;

use std::{future::Future, pin::Pin};

/// Boxed future returned by the collaborator traits so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
