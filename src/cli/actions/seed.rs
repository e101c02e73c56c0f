use crate::{cli::actions::database, seed::reseed};
use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub db_password: Option<SecretString>,
}

/// Replace all portal data with the demo data set.
/// # Errors
/// Returns an error if the database is unreachable or the reseed transaction fails.
pub async fn execute(args: Args) -> Result<()> {
    info!(dsn = %database::redact_dsn(&args.dsn), "reseeding demo data");

    let pool = database::connect(&args.dsn, args.db_password.as_ref()).await?;
    let summary = reseed(&pool).await?;

    info!(
        stations = summary.stations,
        officers = summary.officers,
        reports = summary.reports,
        "reseed complete"
    );
    println!(
        "Seeded {} stations, {} officers and {} reports",
        summary.stations, summary.officers, summary.reports
    );

    Ok(())
}
