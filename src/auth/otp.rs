//! One-time-code second factor.
//!
//! A challenge is a six-digit code bound to the session that requested it. At
//! most one challenge exists per session: a new login attempt replaces the
//! previous one, a successful verification consumes it, and too many wrong
//! guesses or an expired code clear it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{OfficerDirectory, Principal};
use crate::{
    notify::{NotificationMessage, NotificationSender},
    session::SessionData,
};

pub const CODE_LENGTH: usize = 6;
pub const LOGIN_CODE_SUBJECT: &str = "Your SafeIMEI Login Code";

/// Out-of-band channel used to deliver codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Sms,
}

impl DeliveryChannel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryChannel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(format!("unsupported delivery channel: {other}")),
        }
    }
}

/// Pending code stored in the session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    code: String,
    officer_id: Uuid,
    issued_at: DateTime<Utc>,
    #[serde(default)]
    attempts: u32,
}

impl OtpChallenge {
    #[must_use]
    pub fn new(code: String, officer_id: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            code,
            officer_id,
            issued_at,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn officer_id(&self) -> Uuid {
        self.officer_id
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl fmt::Debug for OtpChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpChallenge")
            .field("code", &"******")
            .field("officer_id", &self.officer_id)
            .field("issued_at", &self.issued_at)
            .field("attempts", &self.attempts)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("principal has no {0} destination on file")]
    NoDestination(DeliveryChannel),
    #[error("verification code delivery failed")]
    DeliveryUnavailable,
    #[error("no verification challenge pending")]
    NoChallengePending,
    #[error("verification code mismatch")]
    CodeMismatch,
    #[error("failed to resolve principal: {0}")]
    Lookup(#[source] anyhow::Error),
}

/// What the caller may show after a successful issue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeHandle {
    pub channel: DeliveryChannel,
    /// Masked destination, e.g. `of***@safeimei.com`.
    pub destination_hint: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug)]
pub struct ChallengeConfig {
    channel: DeliveryChannel,
    ttl_seconds: i64,
    max_attempts: u32,
}

impl ChallengeConfig {
    /// Defaults: email delivery, 5 minute lifetime, 5 attempts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channel: DeliveryChannel::Email,
            ttl_seconds: 300,
            max_attempts: 5,
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: DeliveryChannel) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn channel(&self) -> DeliveryChannel {
        self.channel
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a uniformly distributed, zero padded six-digit code.
#[must_use]
pub fn generate_code() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{value:06}")
}

fn mask_destination(destination: &str) -> String {
    if let Some((local, domain)) = destination.split_once('@') {
        let visible: String = local.chars().take(2).collect();
        format!("{visible}***@{domain}")
    } else {
        let chars: Vec<char> = destination.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("***{tail}")
    }
}

pub struct ChallengeIssuer {
    config: ChallengeConfig,
    sender: Arc<dyn NotificationSender>,
    directory: Arc<dyn OfficerDirectory>,
}

impl ChallengeIssuer {
    #[must_use]
    pub fn new(
        config: ChallengeConfig,
        sender: Arc<dyn NotificationSender>,
        directory: Arc<dyn OfficerDirectory>,
    ) -> Self {
        Self {
            config,
            sender,
            directory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    /// Install a fresh challenge for `principal` and deliver the code.
    ///
    /// Any previous challenge in the session is discarded first. If delivery
    /// fails the session ends up with no challenge at all.
    ///
    /// # Errors
    /// `NoDestination` when the principal cannot be reached on the configured
    /// channel, `DeliveryUnavailable` when the transport fails.
    pub async fn issue_challenge(
        &self,
        session: &mut SessionData,
        principal: &Principal,
    ) -> Result<ChallengeHandle, ChallengeError> {
        session.challenge = None;

        let channel = self.config.channel;
        let destination = match channel {
            DeliveryChannel::Email => principal.email.as_deref(),
            DeliveryChannel::Sms => principal.phone.as_deref(),
        }
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ChallengeError::NoDestination(channel))?;

        let code = generate_code();
        let issued_at = Utc::now();
        session.challenge = Some(OtpChallenge::new(
            code.clone(),
            principal.officer_id,
            issued_at,
        ));

        let message = NotificationMessage::new(
            destination,
            LOGIN_CODE_SUBJECT,
            format!("Your verification code is: {code}"),
        );
        if let Err(err) = self.sender.send(&message).await {
            session.challenge = None;
            error!(
                officer = %principal.username,
                channel = %channel,
                "failed to deliver verification code: {err}"
            );
            return Err(ChallengeError::DeliveryUnavailable);
        }

        info!(officer = %principal.username, channel = %channel, "verification code issued");

        Ok(ChallengeHandle {
            channel,
            destination_hint: mask_destination(destination),
            expires_at: issued_at + ChronoDuration::seconds(self.config.ttl_seconds),
        })
    }

    /// Consume the pending challenge and resolve the principal it was issued for.
    ///
    /// # Errors
    /// `NoChallengePending` when nothing is pending (never issued, expired,
    /// already used, or exhausted); `CodeMismatch` on a wrong code.
    pub async fn verify_challenge(
        &self,
        session: &mut SessionData,
        submitted: &str,
    ) -> Result<Principal, ChallengeError> {
        let officer_id = self.check_code(session, submitted, Utc::now())?;
        match self.directory.lookup(officer_id).await {
            Ok(Some(principal)) => Ok(principal),
            Ok(None) => {
                warn!(%officer_id, "challenge issued for an officer that no longer exists");
                Err(ChallengeError::NoChallengePending)
            }
            Err(err) => Err(ChallengeError::Lookup(err)),
        }
    }

    fn check_code(
        &self,
        session: &mut SessionData,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, ChallengeError> {
        let Some(challenge) = session.challenge.as_mut() else {
            return Err(ChallengeError::NoChallengePending);
        };

        if now - challenge.issued_at > ChronoDuration::seconds(self.config.ttl_seconds) {
            session.challenge = None;
            return Err(ChallengeError::NoChallengePending);
        }

        if challenge.code != submitted.trim() {
            challenge.attempts += 1;
            if challenge.attempts >= self.config.max_attempts {
                warn!(
                    officer_id = %challenge.officer_id,
                    "verification attempts exhausted; challenge cleared"
                );
                session.challenge = None;
            }
            return Err(ChallengeError::CodeMismatch);
        }

        let officer_id = challenge.officer_id;
        session.challenge = None;
        Ok(officer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{officer, FailingSender, MemoryDirectory, RecordingSender};

    fn issuer_with(
        sender: Arc<dyn NotificationSender>,
        directory: Arc<MemoryDirectory>,
    ) -> ChallengeIssuer {
        ChallengeIssuer::new(ChallengeConfig::new(), sender, directory)
    }

    fn code_from(message: &NotificationMessage) -> String {
        message
            .body
            .rsplit(' ')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..500 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn masks_destinations() {
        assert_eq!(mask_destination("officer@safeimei.com"), "of***@safeimei.com");
        assert_eq!(mask_destination("+2348012345678"), "***5678");
        assert_eq!(mask_destination("12"), "***12");
    }

    #[test]
    fn channel_parses_case_insensitively() {
        assert_eq!("EMAIL".parse::<DeliveryChannel>(), Ok(DeliveryChannel::Email));
        assert_eq!("sms".parse::<DeliveryChannel>(), Ok(DeliveryChannel::Sms));
        assert!("fax".parse::<DeliveryChannel>().is_err());
    }

    #[test]
    fn debug_hides_code() {
        let challenge = OtpChallenge::new("123456".to_string(), Uuid::new_v4(), Utc::now());
        assert!(!format!("{challenge:?}").contains("123456"));
    }

    #[tokio::test]
    async fn issue_installs_and_delivers_code() {
        let principal = officer("LAG01");
        let sender = Arc::new(RecordingSender::default());
        let issuer = issuer_with(sender.clone(), Arc::new(MemoryDirectory::with(&[&principal])));
        let mut session = SessionData::default();

        let handle = issuer.issue_challenge(&mut session, &principal).await;
        let handle = handle.ok();
        assert_eq!(
            handle.as_ref().map(|h| h.channel),
            Some(DeliveryChannel::Email)
        );

        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "officer.LAG01@safeimei.com");
        assert_eq!(sent[0].subject, LOGIN_CODE_SUBJECT);
        let challenge = session.challenge.as_ref().map(|c| c.code.clone());
        assert_eq!(challenge, Some(code_from(&sent[0])));
        assert_eq!(session.challenge.as_ref().map(OtpChallenge::officer_id), Some(principal.officer_id));
    }

    #[tokio::test]
    async fn second_challenge_replaces_first() {
        let principal = officer("LAG01");
        let sender = Arc::new(RecordingSender::default());
        let issuer = issuer_with(sender.clone(), Arc::new(MemoryDirectory::with(&[&principal])));
        let mut session = SessionData::default();

        assert!(issuer.issue_challenge(&mut session, &principal).await.is_ok());
        // Force a known first code so the test cannot collide with the second one.
        if let Some(challenge) = session.challenge.as_mut() {
            challenge.code = "111111".to_string();
        }
        assert!(issuer.issue_challenge(&mut session, &principal).await.is_ok());
        let second = code_from(&sender.sent().await[1]);

        if second != "111111" {
            assert!(matches!(
                issuer.verify_challenge(&mut session, "111111").await,
                Err(ChallengeError::CodeMismatch)
            ));
        }
        let resolved = issuer.verify_challenge(&mut session, &second).await;
        assert_eq!(resolved.ok(), Some(principal));
    }

    #[tokio::test]
    async fn correct_code_is_single_use() {
        let principal = officer("ABU01");
        let sender = Arc::new(RecordingSender::default());
        let issuer = issuer_with(sender.clone(), Arc::new(MemoryDirectory::with(&[&principal])));
        let mut session = SessionData::default();

        assert!(issuer.issue_challenge(&mut session, &principal).await.is_ok());
        let code = code_from(&sender.sent().await[0]);

        assert!(issuer.verify_challenge(&mut session, &code).await.is_ok());
        assert!(session.challenge.is_none());
        assert!(matches!(
            issuer.verify_challenge(&mut session, &code).await,
            Err(ChallengeError::NoChallengePending)
        ));
    }

    #[tokio::test]
    async fn verify_without_challenge() {
        let issuer = issuer_with(
            Arc::new(RecordingSender::default()),
            Arc::new(MemoryDirectory::default()),
        );
        let mut session = SessionData::default();
        assert!(matches!(
            issuer.verify_challenge(&mut session, "000000").await,
            Err(ChallengeError::NoChallengePending)
        ));
    }

    #[tokio::test]
    async fn delivery_failure_leaves_no_challenge() {
        let principal = officer("KAN01");
        let issuer = issuer_with(
            Arc::new(FailingSender),
            Arc::new(MemoryDirectory::with(&[&principal])),
        );
        let mut session = SessionData {
            challenge: Some(OtpChallenge::new(
                "123456".to_string(),
                principal.officer_id,
                Utc::now(),
            )),
            ..SessionData::default()
        };

        assert!(matches!(
            issuer.issue_challenge(&mut session, &principal).await,
            Err(ChallengeError::DeliveryUnavailable)
        ));
        assert!(session.challenge.is_none());
    }

    #[tokio::test]
    async fn missing_destination_is_refused() {
        let mut principal = officer("KAN02");
        principal.phone = None;
        let sender = Arc::new(RecordingSender::default());
        let issuer = ChallengeIssuer::new(
            ChallengeConfig::new().with_channel(DeliveryChannel::Sms),
            sender.clone(),
            Arc::new(MemoryDirectory::with(&[&principal])),
        );
        let mut session = SessionData::default();

        assert!(matches!(
            issuer.issue_challenge(&mut session, &principal).await,
            Err(ChallengeError::NoDestination(DeliveryChannel::Sms))
        ));
        assert!(session.challenge.is_none());
        assert!(sender.sent().await.is_empty());
    }

    #[test]
    fn leading_zeros_are_significant() {
        let issuer = issuer_with(
            Arc::new(RecordingSender::default()),
            Arc::new(MemoryDirectory::default()),
        );
        let officer_id = Uuid::new_v4();
        let now = Utc::now();
        let mut session = SessionData {
            challenge: Some(OtpChallenge::new("004217".to_string(), officer_id, now)),
            ..SessionData::default()
        };

        assert!(matches!(
            issuer.check_code(&mut session, "4217", now),
            Err(ChallengeError::CodeMismatch)
        ));
        assert!(matches!(
            issuer.check_code(&mut session, " 004217 ", now),
            Ok(id) if id == officer_id
        ));
    }

    #[test]
    fn expired_challenge_is_cleared() {
        let issuer = issuer_with(
            Arc::new(RecordingSender::default()),
            Arc::new(MemoryDirectory::default()),
        );
        let issued = Utc::now();
        let mut session = SessionData {
            challenge: Some(OtpChallenge::new("123456".to_string(), Uuid::new_v4(), issued)),
            ..SessionData::default()
        };

        let later = issued + ChronoDuration::seconds(301);
        assert!(matches!(
            issuer.check_code(&mut session, "123456", later),
            Err(ChallengeError::NoChallengePending)
        ));
        assert!(session.challenge.is_none());
    }

    #[test]
    fn attempts_are_capped() {
        let issuer = ChallengeIssuer::new(
            ChallengeConfig::new().with_max_attempts(3),
            Arc::new(RecordingSender::default()),
            Arc::new(MemoryDirectory::default()),
        );
        let now = Utc::now();
        let mut session = SessionData {
            challenge: Some(OtpChallenge::new("123456".to_string(), Uuid::new_v4(), now)),
            ..SessionData::default()
        };

        for attempt in 1..=2 {
            assert!(matches!(
                issuer.check_code(&mut session, "000000", now),
                Err(ChallengeError::CodeMismatch)
            ));
            assert_eq!(session.challenge.as_ref().map(OtpChallenge::attempts), Some(attempt));
        }
        assert!(matches!(
            issuer.check_code(&mut session, "000000", now),
            Err(ChallengeError::CodeMismatch)
        ));
        assert!(session.challenge.is_none());
        assert!(matches!(
            issuer.check_code(&mut session, "123456", now),
            Err(ChallengeError::NoChallengePending)
        ));
    }
}
