//! statgw binary entry point.
//!
//! Wires configuration, sinks, the ingestion engine, the poll loop, and the
//! metrics endpoint together, then runs until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use prometheus::Registry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statgw::{
    config::{AppConfig, LoggingConfig},
    ingest::{IngestEngine, SourceSpec},
    poller::Poller,
    relay::RelayTracker,
    schema::SchemaTable,
    server::{create_router, AppState},
    sink::{MetricSink, PromSink, PushGatewaySink, TelegrafSink},
};

/// statgw - P2P statistics exporter gateway
#[derive(Parser, Debug)]
#[command(name = "statgw", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "STATGW_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "STATGW_SERVER_BIND")]
    bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "STATGW_SERVER_PORT")]
    port: Option<u16>,
}

fn init_logging(cfg: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,statgw=debug".into());

    if cfg.is_stdout() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        let file_appender = tracing_appender::rolling::daily(&cfg.directory, &cfg.filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .init();

        // Keep the appender alive for the program lifetime.
        std::mem::forget(guard);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    init_logging(&config.logging);
    tracing::info!("statgw - P2P statistics exporter gateway");
    tracing::info!(config = %cli.config, "configuration loaded");

    // Shared registry: the pull endpoint, the PushGateway payload, and the
    // ops counters all read from it.
    let registry = Registry::new();

    let mut sinks: Vec<Arc<dyn MetricSink>> = Vec::new();
    if config.outputs.prometheus || config.outputs.push_gateway {
        sinks.push(Arc::new(PromSink::new(&registry)?));
    }
    if config.outputs.telegraf {
        let target = config.outputs.telegraf_target()?;
        tracing::info!(target = %target, "telegraf output enabled");
        sinks.push(Arc::new(TelegrafSink::new(target)));
    }
    if config.outputs.push_gateway {
        let sink = PushGatewaySink::new(
            registry.clone(),
            &config.outputs.push_gateway_addr,
            &config.outputs.job_name,
            config.outputs.instance.as_deref(),
        );
        tracing::info!(url = %sink.push_url(), "push gateway output enabled");
        sinks.push(Arc::new(sink));
    }

    let mut sources = Vec::new();
    for (name, flag_path) in &config.sources {
        sources.push(SourceSpec {
            schema: SchemaTable::get(name)?,
            flag_path: flag_path.clone(),
        });
    }
    tracing::info!(sources = sources.len(), "sources configured");

    let tracker = RelayTracker::new(config.relay_identities());
    if tracker.fleet_size() > 0 {
        tracing::info!(fleet = tracker.fleet_size(), "relay fleet membership loaded");
    }

    let engine = IngestEngine::new(sources, sinks, tracker, &registry)?;
    let poller = Poller::new(engine, config.poll.period, &registry)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    if config.outputs.prometheus {
        let app = create_router(AppState {
            registry: registry.clone(),
        });
        let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("metrics endpoint listening on http://{addr}/metrics");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    tracing::info!("shutting down poll loop...");
    shutdown_tx.send(true)?;
    poller_handle.await?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("received terminate signal");
        }
    }
}
