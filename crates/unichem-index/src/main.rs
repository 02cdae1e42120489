//! UniChem indexer - main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use unichem_common::logging::{init_logging, LogConfig, LogLevel};

use unichem_index::config::{Config, DEFAULT_CONFIG_PATH};
use unichem_index::{pipeline, sources, update, validate};

#[derive(Parser, Debug)]
#[command(name = "unichem-index", disable_version_flag = true)]
#[command(about = "Bulk-indexes the UniChem compound catalog into Elasticsearch")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Print version and build date, then exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Override the configured Elasticsearch host
    #[arg(long)]
    eshost: Option<String>,

    /// Override the configured database connection string
    #[arg(long)]
    oraconn: Option<String>,

    /// Run the update & validate path instead of a full extraction
    #[arg(short = 'u', long)]
    update: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!(
            "unichem-index {} (built {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("BUILD_DATE").unwrap_or("unknown"),
        );
        return ExitCode::SUCCESS;
    }

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(eshost) = cli.eshost {
        config.elastic_host = eshost;
    }
    if let Some(oraconn) = cli.oraconn {
        config.oracle_conn = oraconn;
    }

    let log_config = LogConfig {
        level: if cli.debug {
            LogLevel::Debug
        } else {
            LogLevel::Info
        },
        log_dir: config.log_path.clone(),
        log_file_prefix: "unichem-index".to_string(),
        filter_directives: Some("sqlx=warn,reqwest=warn,hyper=warn".to_string()),
        include_targets: true,
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "-------------- Init unichem-index --------------"
    );

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    match run(config, cli.update, cancel).await {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => {
            warn!("Run ended canceled");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = ?e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Run the selected mode plus the shared metadata/validation tail; returns
/// whether the cancellation scope tripped
async fn run(config: Config, update_mode: bool, cancel: CancellationToken) -> Result<bool> {
    let config = Arc::new(config);
    let mut canceled = false;

    if update_mode {
        let summary = update::update_from_last_uci(&config, &cancel)
            .await
            .context("updating from last indexed UCI")?;
        canceled |= summary.canceled;

        if !cancel.is_cancelled() {
            let summary = update::update_changed_sources(&config, &cancel)
                .await
                .context("updating changed sources")?;
            canceled |= summary.canceled;
        }
    } else {
        let summary = pipeline::run_extraction(Arc::clone(&config), cancel.clone()).await;
        canceled = summary.canceled;
    }

    sources::refresh_sources(&config)
        .await
        .context("refreshing source metadata")?;

    let matched = validate::validate_load(&config)
        .await
        .context("validating the load")?;
    info!(matched, "Db count and index count match");

    Ok(canceled || cancel.is_cancelled())
}

/// Trip the shared cancellation scope on SIGINT or SIGTERM
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                warn!("Received interrupt, canceling the run");
            },
            _ = terminate => {
                warn!("Received terminate signal, canceling the run");
            },
        }
        cancel.cancel();
    });
}
