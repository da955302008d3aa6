//! Collegium server entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use collegium::app::{self, AppState};
use collegium_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use collegium_core::{Channel, InMemoryRepository, TracingNotifier};
use collegium_telemetry::init_telemetry;

const DEFAULT_CONFIG_FILE: &str = "collegium.toml";

/// Command-line arguments.
struct Args {
    /// Configuration file; `collegium.toml` is used when present.
    config: Option<PathBuf>,
}

enum Command {
    Run(Args),
    Exit(ExitCode),
}

impl Args {
    fn parse() -> Command {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => match args.next() {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("--config requires a path");
                        return Command::Exit(ExitCode::from(2));
                    }
                },
                "--help" | "-h" => {
                    print_help();
                    return Command::Exit(ExitCode::SUCCESS);
                }
                "--version" | "-v" => {
                    println!("collegium {}", collegium::VERSION);
                    return Command::Exit(ExitCode::SUCCESS);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    return Command::Exit(ExitCode::from(2));
                }
            }
        }

        Command::Run(Self { config })
    }
}

fn print_help() {
    println!(
        r"Collegium - university management request pipeline

USAGE:
    collegium [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    COLLEGIUM__SERVER__HTTP_ADDR          Listen address (default: 0.0.0.0:8080)
    COLLEGIUM__RATE_LIMIT__LIMIT          Requests per window (default: 100)
    COLLEGIUM__RATE_LIMIT__WINDOW_SECS    Window length in seconds (default: 60)
    COLLEGIUM__LOCATIONS__ALLOWED         Comma-separated campuses (default: smart,fayoum)
    COLLEGIUM__DEVELOPMENT                Expose error details (default: false)
    COLLEGIUM__TELEMETRY__METRICS__ENABLED  Prometheus exporter (default: false)
    RUST_LOG                              Log filter override

A .env file in the working directory is loaded before the environment."
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse() {
        Command::Run(args) => args,
        Command::Exit(code) => return code,
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = ?error, "collegium stopped with an error");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::new()
            .with_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    let config = loader
        .with_dotenv()?
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    let _telemetry =
        init_telemetry(&app::telemetry_config(&config)).context("initializing telemetry")?;

    tracing::info!(
        version = collegium::VERSION,
        development = config.development,
        allowed_locations = ?config.locations.allowed,
        "starting collegium"
    );

    let state = AppState::new(
        InMemoryRepository::seeded(app::sample_departments()),
        config.locations.policy(),
        Arc::new(TracingNotifier::new(Channel::Email)),
    );

    let limiter = app::rate_limiter(&config.rate_limit);
    let purge = limiter
        .as_ref()
        .map(|limiter| app::spawn_limiter_purge(Arc::clone(limiter), config.rate_limit_window()));

    let result = app::build_server(&config, &state, limiter).run().await;

    if let Some(purge) = purge {
        purge.abort();
    }
    result.context("server failed")
}
