//! kindops - Entry Point
//!
//! Renders parameterized templates and deploys them to local Kubernetes
//! clusters through kubectl or helm.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};

use kindops::app::cli::Cli;
use kindops::app::options::AppOptions;
use kindops::app::run::run;
use kindops::app::state::AppState;
use kindops::filesys::File;
use kindops::logs::init_logging;
use kindops::storage::layout::StorageLayout;
use kindops::storage::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Retrieve the settings file; a missing default file means defaults
    let layout = StorageLayout::default();
    let settings_file = match &cli.config {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = if cli.config.is_some() || settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        Settings::default()
    };

    let mut options = AppOptions::from_settings(layout, &settings);
    if let Some(dir) = &cli.templates {
        options.templates_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        options.logging.log_level = level.clone();
    }
    if cli.json_logs {
        options.logging.json_format = true;
    }

    // Initialize logging
    let _log_guard = match init_logging(options.logging.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    debug!("Running with options: {:?}", options);

    let state = AppState::init(options);
    match run(state, cli.command, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
                info!("Ctrl+C received, shutting down...");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
