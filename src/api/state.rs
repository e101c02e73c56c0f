//! Portal configuration and the collaborators shared by every handler.

use std::{sync::Arc, time::Duration};

use crate::{
    auth::{
        otp::{ChallengeConfig, ChallengeIssuer},
        OfficerDirectory,
    },
    geo::GeoLocator,
    notify::NotificationSender,
    report::{
        materializer::Materializer,
        payments::PaymentGateway,
        public::{PublicReportConfig, PublicReportService, DEFAULT_REPORT_FEE_KOBO},
        repo::ReportRepository,
    },
    session::SessionStore,
    wizard::{forms::report_wizard, WizardController},
};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const PAYMENT_CALLBACK_PATH: &str = "/v1/payments/verify";

#[derive(Clone, Debug)]
pub struct PortalConfig {
    public_base_url: String,
    session_ttl_seconds: i64,
    challenge: ChallengeConfig,
    report_fee_kobo: u64,
}

impl PortalConfig {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            challenge: ChallengeConfig::default(),
            report_fee_kobo: DEFAULT_REPORT_FEE_KOBO,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_challenge(mut self, challenge: ChallengeConfig) -> Self {
        self.challenge = challenge;
        self
    }

    #[must_use]
    pub fn with_report_fee_kobo(mut self, fee_kobo: u64) -> Self {
        self.report_fee_kobo = fee_kobo;
        self
    }

    pub(crate) fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn session_ttl(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.session_ttl_seconds).unwrap_or(0))
    }

    /// Cookies are only marked secure when the portal is served over HTTPS.
    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.public_base_url.starts_with("https://")
    }

    #[must_use]
    pub fn payment_callback_url(&self) -> String {
        format!("{}{PAYMENT_CALLBACK_PATH}", self.public_base_url)
    }
}

pub struct PortalState {
    config: PortalConfig,
    sessions: Arc<dyn SessionStore>,
    directory: Arc<dyn OfficerDirectory>,
    reports: Arc<dyn ReportRepository>,
    sender: Arc<dyn NotificationSender>,
    geo: Arc<dyn GeoLocator>,
    challenges: ChallengeIssuer,
    wizard: WizardController,
    payments: Option<Arc<dyn PaymentGateway>>,
    public_reports: Option<PublicReportService>,
}

impl PortalState {
    #[must_use]
    pub fn new(
        config: PortalConfig,
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn OfficerDirectory>,
        reports: Arc<dyn ReportRepository>,
        sender: Arc<dyn NotificationSender>,
        geo: Arc<dyn GeoLocator>,
    ) -> Self {
        let challenges = ChallengeIssuer::new(config.challenge, sender.clone(), directory.clone());
        let wizard = WizardController::new(report_wizard(), Materializer::new(reports.clone()));
        Self {
            config,
            sessions,
            directory,
            reports,
            sender,
            geo,
            challenges,
            wizard,
            payments: None,
            public_reports: None,
        }
    }

    /// Enable public self-reporting and the payment callback.
    #[must_use]
    pub fn with_payments(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        let public = PublicReportConfig::new(self.config.payment_callback_url())
            .with_fee_kobo(self.config.report_fee_kobo);
        self.public_reports = Some(PublicReportService::new(
            self.reports.clone(),
            gateway.clone(),
            public,
        ));
        self.payments = Some(gateway);
        self
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub(crate) fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub(crate) fn directory(&self) -> &dyn OfficerDirectory {
        self.directory.as_ref()
    }

    pub(crate) fn reports(&self) -> &dyn ReportRepository {
        self.reports.as_ref()
    }

    pub(crate) fn sender(&self) -> &dyn NotificationSender {
        self.sender.as_ref()
    }

    pub(crate) fn geo(&self) -> &dyn GeoLocator {
        self.geo.as_ref()
    }

    pub(crate) fn challenges(&self) -> &ChallengeIssuer {
        &self.challenges
    }

    pub(crate) fn wizard(&self) -> &WizardController {
        &self.wizard
    }

    pub(crate) fn payments(&self) -> Option<&dyn PaymentGateway> {
        self.payments.as_deref()
    }

    pub(crate) fn public_reports(&self) -> Option<&PublicReportService> {
        self.public_reports.as_ref()
    }
}
