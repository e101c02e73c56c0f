use crate::geo::IPINFO_URL;
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Options {
    pub mail_from: String,
    pub resend_api_key: Option<SecretString>,
    pub sms_gateway_url: Option<String>,
    pub sms_gateway_token: Option<SecretString>,
    pub paystack_secret_key: Option<SecretString>,
    pub report_fee_kobo: u64,
    pub geo_lookup_url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a value with a default is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = |id: &str| {
            matches
                .get_one::<String>(id)
                .filter(|value| !value.trim().is_empty())
                .map(|value| SecretString::from(value.clone()))
        };

        Ok(Self {
            mail_from: matches
                .get_one::<String>("mail-from")
                .cloned()
                .context("missing required argument: --mail-from")?,
            resend_api_key: secret("resend-api-key"),
            sms_gateway_url: matches
                .get_one::<String>("sms-gateway-url")
                .filter(|value| !value.trim().is_empty())
                .cloned(),
            sms_gateway_token: secret("sms-gateway-token"),
            paystack_secret_key: secret("paystack-secret-key"),
            report_fee_kobo: matches
                .get_one::<u64>("report-fee-kobo")
                .copied()
                .context("missing required argument: --report-fee-kobo")?,
            geo_lookup_url: matches
                .get_one::<String>("geo-lookup-url")
                .cloned()
                .context("missing required argument: --geo-lookup-url")?,
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_notify_args(command);
    with_payment_args(command)
}

fn with_notify_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("mail-from")
                .long("mail-from")
                .help("Sender address for outgoing email")
                .env("SAFEIMEI_MAIL_FROM")
                .default_value("SafeIMEI <onboarding@resend.dev>"),
        )
        .arg(
            Arg::new("resend-api-key")
                .long("resend-api-key")
                .help("Resend API key; without it email is only logged")
                .env("SAFEIMEI_RESEND_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("sms-gateway-url")
                .long("sms-gateway-url")
                .help("HTTP endpoint accepting SMS deliveries")
                .env("SAFEIMEI_SMS_GATEWAY_URL"),
        )
        .arg(
            Arg::new("sms-gateway-token")
                .long("sms-gateway-token")
                .help("Bearer token for the SMS gateway")
                .env("SAFEIMEI_SMS_GATEWAY_TOKEN")
                .hide_env_values(true),
        )
}

fn with_payment_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("paystack-secret-key")
                .long("paystack-secret-key")
                .help("Paystack secret key; without it public reporting is disabled")
                .env("SAFEIMEI_PAYSTACK_SECRET_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("report-fee-kobo")
                .long("report-fee-kobo")
                .help("Public report fee in kobo")
                .env("SAFEIMEI_REPORT_FEE_KOBO")
                .default_value("100000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("geo-lookup-url")
                .long("geo-lookup-url")
                .help("IP geolocation service base URL")
                .env("SAFEIMEI_GEO_LOOKUP_URL")
                .default_value(IPINFO_URL),
        )
}
