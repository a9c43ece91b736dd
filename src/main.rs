//! Selective DNS server - Entry point.
//!
//! Loads the network contexts from the config file, then serves DNS on the
//! configured port, answering each query according to the network the host
//! is currently attached to.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use selective_dns::cache::MokaCache;
use selective_dns::config::Config;
use selective_dns::dns::{ForwardingUpstream, NetworkRegistry, SystemUpstream, Upstream};
use selective_dns::network::InterfaceLocator;
use selective_dns::server::{QueryHandler, run_server};
use selective_dns::{EngineOptions, ResolutionEngine};

#[derive(Debug, Parser)]
#[command(name = "selective-dns", version, about)]
struct Args {
    /// Path of the config file [default: ~/.config/selective-dns.toml]
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Do not print the query log
    #[arg(short, long)]
    quiet: bool,
}

fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set, pass --config")?;
    Ok(PathBuf::from(home).join(".config").join("selective-dns.toml"))
}

/// Build the engine around the chosen upstream and serve until Ctrl-C.
async fn serve<U: Upstream>(
    config: &Config,
    registry: NetworkRegistry,
    upstream: U,
    quiet: bool,
) -> Result<()> {
    let engine = ResolutionEngine::new(
        InterfaceLocator::new(config.interface.clone()),
        MokaCache::new(),
        upstream,
        registry,
        EngineOptions {
            upstream_timeout: config.upstream_timeout(),
            ttl: config.ttl,
            quiet,
        },
    );
    let handler = QueryHandler::new(engine);

    let addr = config.listen_addr();
    let protocol = config.protocol;
    let server_handle = tokio::spawn(async move { run_server(handler, addr, protocol).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down...");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("Server error: {err}");
                    return Err(err).context("Server stopped");
                }
                Err(err) => error!("Server task failed: {err}"),
            }
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let registry =
        NetworkRegistry::from_settings(&config.networks).context("Invalid network configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    selective_dns::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting selective DNS resolver...");
    info!(
        "Loaded {} networks with {} overrides",
        registry.len(),
        registry.override_count()
    );
    match config.interface.as_deref() {
        Some(name) => info!("Detecting network on interface: {name}"),
        None => info!("Detecting network on all interfaces"),
    }

    match config.upstream_resolver {
        Some(addr) => {
            info!("Upstream resolver: {addr}");
            serve(&config, registry, ForwardingUpstream::new(addr), args.quiet).await
        }
        None => {
            info!("Upstream resolver: system");
            serve(&config, registry, SystemUpstream::new(), args.quiet).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run(Args::parse()).await
}
