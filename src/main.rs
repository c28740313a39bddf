//! resource-fetch - Load a single resource with the resource-loader stack
//!
//! Fetches one url through the configured transport, retry policy and
//! optional offline cache, then writes the payload to stdout or a file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tracing::{error, info, warn};

use resource_loader::cache::{CacheGateway, FilesystemCache, FilesystemCacheConfig};
use resource_loader::config::Config;
use resource_loader::loader::{LoadOptions, LoaderContext, RequestOutcome, ResourceLoader};
use resource_loader::telemetry::init_tracing;
use resource_loader::transport::{HttpTransport, HttpTransportConfig, Progress};

/// resource-fetch - Load a single resource with retry and offline cache
#[derive(Parser, Debug)]
#[command(name = "resource-fetch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Url to load, relative to loader.base_url
    url: String,

    /// Path to the configuration file
    #[arg(short, long, env = "RESOURCE_LOADER_CONFIG")]
    config: Option<String>,

    /// Load raw bytes instead of text
    #[arg(short, long)]
    binary: bool,

    /// Write the payload to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable the offline cache in this directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args)?;
    if let Some(dir) = &args.cache_dir {
        config.cache.enabled = true;
        config.cache.base_path = dir.clone();
    }

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %args.url,
        "Starting resource-fetch"
    );

    let transport = HttpTransport::new(HttpTransportConfig::from(&config.loader))?;
    let loader = ResourceLoader::new(LoaderContext::from_config(&config, Arc::new(transport)));

    let mut options = LoadOptions::new()
        .binary(args.binary)
        .on_progress(|p: Progress| match p.total {
            Some(total) => info!(loaded = p.loaded, total = total, "Progress"),
            None => info!(loaded = p.loaded, "Progress"),
        })
        .on_complete(|outcome: &RequestOutcome| info!(outcome = ?outcome, "Request completed"));

    if config.cache.enabled {
        let cache = FilesystemCache::new(FilesystemCacheConfig::from(&config.cache));
        info!(path = %cache.base_path().display(), "Offline cache enabled");
        options = options.cache(Arc::new(cache) as Arc<dyn CacheGateway>);
    }

    let request = loader.load(&args.url, options);
    let state = request.state();
    let wait = request.wait();
    tokio::pin!(wait);

    let result = tokio::select! {
        result = &mut wait => result,
        _ = shutdown_signal() => {
            state.abort();
            wait.await
        }
    };

    let resource = match result {
        Ok(Some(resource)) => resource,
        Ok(None) => {
            warn!("Load aborted");
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "Load failed");
            return Err(e.into());
        }
    };

    info!(
        source = ?resource.source,
        response_url = resource.response_url.as_deref().unwrap_or(""),
        size = resource.payload.len(),
        "Resource loaded"
    );

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, resource.payload.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Payload written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(resource.payload.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e)),
    }
}

/// Resolves when Ctrl+C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, aborting load"),
        _ = terminate => info!("Received SIGTERM, aborting load"),
    }
}
