//! Kilowatch CLI

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kilowatch_client::{ClientConfig, DeviceClient, RedfishPoller};
use kilowatch_collector::{BreakerSettings, Collector};
use kilowatch_config::load_config;
use kilowatch_metrics::ExporterMetrics;
use kilowatch_runtime::{ExpositionServer, ShutdownSignal, SignalHandler};
use tokio::sync::Semaphore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kilowatch")]
#[command(about = "Redfish power and sensor telemetry exporter", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the exporter (poll loop plus exposition server)
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml", env = "KILOWATCH_CONFIG")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Convert an IPMI inventory JSON file into target entries
    ImportInventory {
        /// Path to the inventory JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Write the generated YAML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Credential group the generated targets reference
        #[arg(long, default_value = "default")]
        auth_group: String,

        /// Keep only hosts whose name starts with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Sensors every generated target polls
        #[arg(long, default_values_t = vec!["LiquidLeak".to_string()])]
        sensors: Vec<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, log_level } => {
            init_tracing(&log_level);

            tracing::info!("starting kilowatch exporter");
            tracing::info!("config file: {}", config.display());

            let config = load_config(config)?;
            tracing::info!(
                listen = %config.listen,
                targets = config.targets.len(),
                interval = ?config.poll_interval,
                max_in_flight = config.max_in_flight,
                "configuration loaded"
            );

            serve(config).await
        }

        Commands::Validate { config } => {
            tracing_subscriber::fmt().with_target(false).init();

            tracing::info!("validating configuration: {}", config.display());

            match load_config(&config) {
                Ok(cfg) => {
                    tracing::info!("✓ configuration is valid");
                    tracing::info!("  listen: {}", cfg.listen);
                    tracing::info!("  poll interval: {:?}", cfg.poll_interval);
                    tracing::info!("  targets: {}", cfg.targets.len());
                    tracing::info!("  auth groups: {}", cfg.auth.groups.len());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::ImportInventory {
            input,
            output,
            auth_group,
            prefix,
            sensors,
        } => {
            tracing_subscriber::fmt().with_target(false).init();

            use kilowatch_config::inventory;

            let hosts = inventory::load_inventory(&input)?;
            let targets =
                inventory::hosts_to_targets(&hosts, &auth_group, prefix.as_deref(), &sensors);
            tracing::info!(
                hosts = hosts.len(),
                targets = targets.len(),
                "converted inventory"
            );

            let yaml = inventory::render_targets_yaml(&targets)?;
            match output {
                Some(path) => {
                    fs::write(&path, yaml)?;
                    tracing::info!("wrote {}", path.display());
                }
                None => print!("{yaml}"),
            }
            Ok(())
        }

        Commands::Version => {
            println!("kilowatch exporter");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

/// Wire everything up and run until a shutdown signal arrives
async fn serve(config: kilowatch_config::Config) -> Result<()> {
    let metrics = Arc::new(ExporterMetrics::new()?);

    let client_config = ClientConfig {
        connect_timeout: config.connect_timeout,
        read_timeout: config.read_timeout,
        total_timeout: config.effective_total_timeout(),
        max_retries: config.max_retries,
        backoff_base: config.backoff_base,
        tls_verify: config.tls_verify,
    };
    let client = DeviceClient::new(client_config)?
        .with_admission_gate(Arc::new(Semaphore::new(config.max_in_flight)))
        .with_in_flight_gauge(metrics.in_flight_gauge());

    let targets = config.resolve_targets()?;
    let collector = Arc::new(Collector::new(
        targets,
        Arc::new(RedfishPoller::new(client)),
        Arc::clone(&metrics),
        BreakerSettings {
            fail_threshold: config.circuit_breaker.fail_threshold,
            cooldown_cycles: config.circuit_breaker.cooldown_cycles,
        },
        config.poll_interval,
    ));

    let shutdown = ShutdownSignal::new();
    let server = ExpositionServer::bind(config.listen, Arc::clone(&metrics), shutdown.clone()).await?;

    tokio::spawn(SignalHandler::new(shutdown.clone()).run());
    let collector_handle = tokio::spawn(collector.run(shutdown.subscribe()));

    server.run().await;
    collector_handle.await?;

    tracing::info!("exporter stopped");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into()))
        .init();
}
