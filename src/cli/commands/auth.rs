use crate::auth::otp::DeliveryChannel;
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};

#[derive(Debug)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub otp_channel: DeliveryChannel,
    pub otp_ttl_seconds: i64,
    pub otp_max_attempts: u32,
}

impl Options {
    /// # Errors
    /// Returns an error if a value is missing or the OTP channel is unknown.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let otp_channel = matches
            .get_one::<String>("otp-channel")
            .context("missing required argument: --otp-channel")?
            .parse::<DeliveryChannel>()
            .map_err(|err| anyhow!(err))?;

        Ok(Self {
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .context("missing required argument: --session-ttl-seconds")?,
            otp_channel,
            otp_ttl_seconds: matches
                .get_one::<i64>("otp-ttl-seconds")
                .copied()
                .context("missing required argument: --otp-ttl-seconds")?,
            otp_max_attempts: matches
                .get_one::<u32>("otp-max-attempts")
                .copied()
                .context("missing required argument: --otp-max-attempts")?,
        })
    }
}

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds")
                .env("SAFEIMEI_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-channel")
                .long("otp-channel")
                .help("Where officer sign-in codes are delivered")
                .env("SAFEIMEI_OTP_CHANNEL")
                .default_value("email")
                .value_parser(["email", "sms"]),
        )
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("Sign-in code lifetime in seconds")
                .env("SAFEIMEI_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-max-attempts")
                .long("otp-max-attempts")
                .help("Wrong codes allowed before the challenge is discarded")
                .env("SAFEIMEI_OTP_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}
