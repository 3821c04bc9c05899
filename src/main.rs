use clap::Parser;
use registrar::app::App;
use registrar::cli::Args;
use registrar::config::Config;
use registrar::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logging needs the config, so a config error can only go to stderr.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        port = config.port,
        "starting registrar"
    );

    let app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    app.run().await
}
