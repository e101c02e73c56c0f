use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use url::Url;

/// Connect to Postgres, injecting `password` into `dsn` when given.
///
/// # Errors
/// Returns an error if the DSN is invalid or the database is unreachable.
pub async fn connect(dsn: &str, password: Option<&SecretString>) -> Result<PgPool> {
    let dsn = with_password(dsn, password)?;

    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")
}

fn with_password(dsn: &str, password: Option<&SecretString>) -> Result<String> {
    let Some(password) = password else {
        return Ok(dsn.to_string());
    };

    let mut dsn = Url::parse(dsn).context("Invalid database connection string")?;
    dsn.set_password(Some(password.expose_secret()))
        .map_err(|()| anyhow!("Error setting password"))?;

    Ok(dsn.to_string())
}

/// DSN safe to log.
pub fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
