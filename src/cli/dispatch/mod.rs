//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{seed, server, Action};
use crate::cli::commands::{auth, integrations, SEED_COMMAND};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let db_password = matches
        .get_one::<String>("db-password")
        .filter(|password| !password.is_empty())
        .map(|password| SecretString::from(password.clone()));

    if matches.subcommand_name() == Some(SEED_COMMAND) {
        return Ok(Action::Seed(seed::Args { dsn, db_password }));
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let public_base_url = matches
        .get_one::<String>("public-base-url")
        .cloned()
        .context("missing required argument: --public-base-url")?;

    let auth_opts = auth::Options::parse(matches)?;
    let integration_opts = integrations::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port,
        dsn,
        db_password,
        public_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        otp_channel: auth_opts.otp_channel,
        otp_ttl_seconds: auth_opts.otp_ttl_seconds,
        otp_max_attempts: auth_opts.otp_max_attempts,
        mail_from: integration_opts.mail_from,
        resend_api_key: integration_opts.resend_api_key,
        sms_gateway_url: integration_opts.sms_gateway_url,
        sms_gateway_token: integration_opts.sms_gateway_token,
        paystack_secret_key: integration_opts.paystack_secret_key,
        report_fee_kobo: integration_opts.report_fee_kobo,
        geo_lookup_url: integration_opts.geo_lookup_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::otp::DeliveryChannel;
    use secrecy::ExposeSecret;

    const DSN: &str = "postgres://safeimei@localhost:5432/safeimei";

    #[test]
    fn server_action_by_default() {
        temp_env::with_vars(
            [
                ("SAFEIMEI_DSN", Some(DSN)),
                ("SAFEIMEI_PORT", Some("9090")),
                ("SAFEIMEI_DB_PASSWORD", Some("s3cret")),
                ("SAFEIMEI_OTP_CHANNEL", Some("sms")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["safeimei"]);
                let action = handler(&matches);
                assert!(matches!(
                    action,
                    Ok(Action::Server(server::Args {
                        port: 9090,
                        otp_channel: DeliveryChannel::Sms,
                        ..
                    }))
                ));
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.dsn, DSN);
                    assert_eq!(
                        args.db_password.as_ref().map(|p| p.expose_secret().to_string()),
                        Some("s3cret".to_string())
                    );
                }
            },
        );
    }

    #[test]
    fn seed_subcommand_only_needs_the_database() {
        temp_env::with_vars(
            [("SAFEIMEI_DSN", Some(DSN)), ("SAFEIMEI_DB_PASSWORD", None)],
            || {
                let matches =
                    crate::cli::commands::new().get_matches_from(vec!["safeimei", "seed"]);
                let action = handler(&matches);
                assert!(matches!(
                    action,
                    Ok(Action::Seed(seed::Args {
                        db_password: None,
                        ..
                    }))
                ));
            },
        );
    }
}
