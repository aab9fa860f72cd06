mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookhound_core::config::LogFormat;
use bookhound_core::{
    create_event_system, load_config, validate_config, Config, FileShare, LibraryService,
    ReadarrClient, SanitizedConfig, SlskdClient, WorkflowCoordinator,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the acquisition event channel
const EVENT_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.logging.level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("BOOKHOUND_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Logging depends on the config, so load errors go to stderr directly
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {:?}: {}", config_path, e);
            std::process::exit(1);
        }
    };
    init_logging(&config);
    info!(version = VERSION, path = ?config_path, "Configuration loaded");

    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration validated");
    debug!(config = %config_json, "Effective configuration");

    let library: Arc<dyn LibraryService> = Arc::new(
        ReadarrClient::new(config.library.clone()).context("Failed to create library client")?,
    );
    let fileshare: Arc<dyn FileShare> = Arc::new(
        SlskdClient::new(config.fileshare.clone()).context("Failed to create file-share client")?,
    );
    info!(
        library = %config.library.url,
        fileshare = %config.fileshare.url,
        "Service clients initialized"
    );

    let (events, reporter) = create_event_system(EVENT_BUFFER_SIZE);
    let reporter_handle = tokio::spawn(reporter.run());

    let textfile = config.metrics.textfile.clone();
    let coordinator =
        WorkflowCoordinator::new(library, fileshare, config).with_events(events);
    let outcome = coordinator.run().await;

    // Dropping the coordinator drops the last event handle and ends the reporter
    drop(coordinator);
    match reporter_handle.await {
        Ok(tally) => debug!(events = tally.total, failures = tally.failures, "Event reporter stopped"),
        Err(e) => warn!(error = %e, "Event reporter task failed"),
    }

    metrics::record_run(outcome.as_ref().ok(), chrono::Utc::now().timestamp());
    if let Some(path) = textfile {
        match metrics::write_textfile(&path).await {
            Ok(()) => info!(path = %path.display(), "Metrics written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write metrics"),
        }
    }

    let summary = outcome.context("Acquisition run failed")?;
    info!(
        summary = %serde_json::to_string(&summary).unwrap_or_default(),
        "Done"
    );
    Ok(())
}
