mod informer_store;
mod kube_provider;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use topowatch_core::{bootstrap::load_config, logging, models::ResourceType, Config};
use topowatch_pipeline::{EventProcessor, Fanout, ReferenceCache, Watcher, WebhookDispatcher};

use kube_provider::KubeWatchProvider;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn build_processor(config: &Config) -> Result<Arc<dyn EventProcessor>> {
    let mut processors: Vec<Arc<dyn EventProcessor>> = Vec::new();

    if config.cache.enabled {
        info!(
            ttl = ?config.cache.ttl(),
            sweep_interval = ?config.cache.sweep_interval(),
            "Reference cache enabled"
        );
        processors.push(Arc::new(ReferenceCache::from_config(&config.cache)));
    }
    if config.webhook.is_enabled() {
        info!(url = %config.webhook.url, "Webhook dispatcher enabled");
        processors.push(Arc::new(WebhookDispatcher::new(&config.webhook)?));
    }

    Ok(match processors.len() {
        1 => processors.remove(0),
        _ => Arc::new(Fanout::new(processors)),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("topowatch starting...");

    // 3. Parse watched resources before touching the cluster
    let resources = config
        .watcher
        .resources
        .iter()
        .map(|arg| arg.parse::<ResourceType>())
        .collect::<topowatch_core::Result<Vec<_>>>()?;

    // 4. Connect to the cluster (in-cluster config, then kubeconfig)
    let client = kube::Client::try_default().await.map_err(|e| {
        error!("Could not create kubernetes client: {}", e);
        anyhow::anyhow!("Kubernetes client creation failed: {e}")
    })?;
    let provider = Arc::new(KubeWatchProvider::new(client));

    // 5. Wire processors to subscriptions
    let processor = build_processor(&config)?;
    let mut watcher = Watcher::new(provider, &config.watcher);
    watcher
        .add_handler(processor, &resources)
        .await
        .map_err(|e| anyhow::anyhow!("Could not add watch handler: {e}"))?;

    // 6. Start and wait for initial sync
    let report = watcher.start().await?;
    if !report.is_complete() {
        warn!(
            unsynced = ?report.unsynced.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Some resources did not sync in time, continuing without them"
        );
    }

    // 7. Run until signalled
    shutdown_signal().await;
    info!("Shutdown signal received, stopping watcher...");
    watcher.stop();
    watcher.join(SHUTDOWN_GRACE).await;
    info!("topowatch stopped");

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
