//! Accident Detector - edge node entry point

use accident_detector::{AccidentDetectionSystem, AppConfig, Collaborators};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "accident_detector", version, about = "Edge accident detection node")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Debug mode: simulated backend, shortened timings, verbose logs
    #[arg(long)]
    debug: bool,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let debug_mode = cli.debug || config.system.debug_mode;

    let default_filter = if debug_mode {
        "accident_detector=debug"
    } else {
        "accident_detector=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.check_config {
        print_summary(&cli.config, &config, debug_mode);
        return Ok(());
    }

    tracing::info!("Starting accident detector v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = %cli.config.display(),
        node_name = %config.node.name,
        api_base_url = %config.api.base_url,
        camera_source = %config.camera.source.display(),
        debug = debug_mode,
        "Configuration loaded"
    );

    let collaborators = Collaborators::from_config(&config, debug_mode)?;
    let system = Arc::new(AccidentDetectionSystem::new(config, debug_mode, collaborators));
    system.start().await?;

    let signal_system = Arc::clone(&system);
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_system.shutdown();
    });

    system.run().await?;
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

fn print_summary(path: &std::path::Path, config: &AppConfig, debug: bool) {
    let timings = config.timings(debug);
    println!("Configuration OK: {}", path.display());
    println!("  node:            {} ({}, {})", config.node.name, config.node.latitude, config.node.longitude);
    println!("  api:             {}", config.api.base_url);
    println!("  camera source:   {}", config.camera.source.display());
    println!("  classifier:      {}", config.camera.classifier_url);
    println!("  state file:      {}", config.system.state_file.display());
    println!("  queue size:      {}", config.performance.frame_queue_size);
    println!(
        "  detection:       threshold {} x {} frames",
        config.detection.accident_confidence_threshold, config.detection.required_consecutive_frames
    );
    println!("  capture every:   {:?}", timings.frame_capture_interval);
    println!("  check interval:  {:?}", timings.reported_check_interval);
    println!("  cooldown:        {:?}", timings.accident_cooldown);
    println!("  heartbeat:       {:?}", timings.heartbeat_interval);
    println!("  debug:           {}", debug);
}
