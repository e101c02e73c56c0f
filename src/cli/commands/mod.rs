pub mod auth;
pub mod integrations;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const SEED_COMMAND: &str = "seed";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("safeimei")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("SAFEIMEI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("SAFEIMEI_DSN")
                .required(true),
        )
        .arg(
            Arg::new("db-password")
                .long("db-password")
                .help("Database password, injected into the DSN")
                .env("SAFEIMEI_DB_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("public-base-url")
                .long("public-base-url")
                .help("Public portal URL used for CORS, cookies and payment callbacks")
                .env("SAFEIMEI_PUBLIC_BASE_URL")
                .default_value("https://safeimei.ng"),
        )
        .subcommand(
            Command::new(SEED_COMMAND)
                .about("Replace all stations, officers and reports with demo data"),
        );

    let command = auth::with_args(command);
    let command = integrations::with_args(command);
    logging::with_args(command)
}
