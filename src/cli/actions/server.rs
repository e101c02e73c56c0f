use crate::{
    api::{self, PortalConfig, PortalState},
    auth::{
        otp::{ChallengeConfig, DeliveryChannel},
        PgOfficerDirectory,
    },
    cli::actions::database,
    geo::IpInfoLocator,
    notify::{
        ChannelRouter, HttpSmsSender, LogNotificationSender, NotificationSender,
        ResendEmailSender,
    },
    report::{payments::PaystackGateway, PgReportRepository},
    session::PgSessionStore,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub db_password: Option<SecretString>,
    pub public_base_url: String,
    pub session_ttl_seconds: i64,
    pub otp_channel: DeliveryChannel,
    pub otp_ttl_seconds: i64,
    pub otp_max_attempts: u32,
    pub mail_from: String,
    pub resend_api_key: Option<SecretString>,
    pub sms_gateway_url: Option<String>,
    pub sms_gateway_token: Option<SecretString>,
    pub paystack_secret_key: Option<SecretString>,
    pub report_fee_kobo: u64,
    pub geo_lookup_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, a client cannot be built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = database::connect(&args.dsn, args.db_password.as_ref()).await?;

    let config = PortalConfig::new(args.public_base_url.clone())
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_challenge(
            ChallengeConfig::new()
                .with_channel(args.otp_channel)
                .with_ttl_seconds(args.otp_ttl_seconds)
                .with_max_attempts(args.otp_max_attempts),
        )
        .with_report_fee_kobo(args.report_fee_kobo);

    let mut state = PortalState::new(
        config,
        Arc::new(PgSessionStore::new(pool.clone())),
        Arc::new(PgOfficerDirectory::new(pool.clone())),
        Arc::new(PgReportRepository::new(pool.clone())),
        notification_sender(&args)?,
        Arc::new(IpInfoLocator::new(args.geo_lookup_url.clone())?),
    );

    match args.paystack_secret_key {
        Some(secret_key) => {
            state = state.with_payments(Arc::new(PaystackGateway::new(secret_key)?));
        }
        None => warn!("No Paystack secret key configured, public reporting is disabled"),
    }

    api::new(args.port, pool, state).await
}

fn notification_sender(args: &Args) -> Result<Arc<dyn NotificationSender>> {
    let email: Arc<dyn NotificationSender> = match &args.resend_api_key {
        Some(api_key) => Arc::new(ResendEmailSender::new(
            api_key.clone(),
            args.mail_from.clone(),
        )?),
        None => {
            warn!("No Resend API key configured, email is only logged");
            Arc::new(LogNotificationSender)
        }
    };

    let mut router = ChannelRouter::new(email);
    if let Some(url) = &args.sms_gateway_url {
        router = router.with_sms(Arc::new(HttpSmsSender::new(
            url.clone(),
            args.sms_gateway_token.clone(),
        )?));
    } else if args.otp_channel == DeliveryChannel::Sms {
        warn!("OTP channel is sms but no SMS gateway is configured");
    }

    Ok(Arc::new(router))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", database::redact_dsn(&args.dsn)),
        ("db_password_set", args.db_password.is_some().to_string()),
        ("public_base_url", args.public_base_url.clone()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        ("otp_channel", args.otp_channel.to_string()),
        ("otp_ttl_seconds", args.otp_ttl_seconds.to_string()),
        ("otp_max_attempts", args.otp_max_attempts.to_string()),
        ("mail_from", args.mail_from.clone()),
        ("resend_api_key_set", args.resend_api_key.is_some().to_string()),
        (
            "sms_gateway_url",
            args.sms_gateway_url
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("payments_enabled", args.paystack_secret_key.is_some().to_string()),
        ("report_fee_kobo", args.report_fee_kobo.to_string()),
        ("geo_lookup_url", args.geo_lookup_url.clone()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\nStartup configuration:", banner());
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn banner() -> String {
    format!(
        "S A F E I M E I - {} - {}",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    )
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
