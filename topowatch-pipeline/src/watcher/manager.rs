//! Pipeline orchestration
//!
//! Binds subscriptions for any number of resource types to one relay queue per
//! processor and owns their joint lifecycle.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use topowatch_core::config::WatcherConfig;
use topowatch_core::models::ResourceType;
use tracing::{error, info, warn};

use super::provider::{Subscription, WatchProvider};
use crate::error::{Error, Result};
use crate::processor::EventProcessor;
use crate::relay::RelayQueue;

/// Outcome of waiting for initial sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: Vec<ResourceType>,
    pub unsynced: Vec<ResourceType>,
}

impl SyncReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unsynced.is_empty()
    }
}

pub struct Watcher {
    provider: Arc<dyn WatchProvider>,
    queues: Vec<Arc<RelayQueue>>,
    subscriptions: Vec<Box<dyn Subscription>>,
    sync_timeout: Duration,
    high_water_mark: usize,
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl Watcher {
    pub fn new(provider: Arc<dyn WatchProvider>, config: &WatcherConfig) -> Self {
        Self {
            provider,
            queues: Vec::new(),
            subscriptions: Vec::new(),
            sync_timeout: config.sync_timeout(),
            high_water_mark: config.queue_high_water_mark,
            cancel_token: CancellationToken::new(),
            handles: Vec::new(),
            started: false,
        }
    }

    /// Route every change of `resources` through a new relay queue into `processor`
    ///
    /// An error leaves the watcher partially initialised; callers should treat
    /// it as fatal rather than carry on with the resources that did subscribe.
    pub async fn add_handler(
        &mut self,
        processor: Arc<dyn EventProcessor>,
        resources: &[ResourceType],
    ) -> Result<Arc<RelayQueue>> {
        let queue = Arc::new(RelayQueue::new(
            processor.name().to_string(),
            processor,
            self.high_water_mark,
        ));
        self.queues.push(Arc::clone(&queue));

        for resource in resources {
            self.add_subscription(&queue, resource).await?;
        }
        Ok(queue)
    }

    /// Feed one more resource type into an existing queue
    pub async fn add_subscription(
        &mut self,
        queue: &Arc<RelayQueue>,
        resource: &ResourceType,
    ) -> Result<()> {
        let subscription = self
            .provider
            .subscribe(resource, Arc::clone(queue) as _)
            .await?;
        info!(resource = %resource, queue = %queue.name(), "Subscribed to resource");
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// Start subscriptions and queue consumers, then wait for initial sync
    ///
    /// A resource that does not sync within the timeout is reported and keeps
    /// running; it does not hold up the others.
    pub async fn start(&mut self) -> Result<SyncReport> {
        if self.started {
            return Err(Error::AlreadyRunning("watcher".to_string()));
        }
        self.started = true;

        for queue in &self.queues {
            queue.processor().start();
            self.handles.push(queue.spawn());
        }
        for subscription in &self.subscriptions {
            subscription.start(self.cancel_token.child_token());
        }

        let sync_timeout = self.sync_timeout;
        let waits = self.subscriptions.iter().map(|subscription| async move {
            let mut synced = subscription.synced();
            let ok = matches!(
                tokio::time::timeout(sync_timeout, synced.wait_for(|synced| *synced)).await,
                Ok(Ok(_))
            );
            (subscription.resource().clone(), ok)
        });

        let mut report = SyncReport::default();
        for (resource, ok) in join_all(waits).await {
            if ok {
                report.synced.push(resource);
            } else {
                error!(resource = %resource, timeout = ?sync_timeout, "Could not sync informer");
                report.unsynced.push(resource);
            }
        }

        info!(
            synced = report.synced.len(),
            unsynced = report.unsynced.len(),
            "Watcher started"
        );
        Ok(report)
    }

    /// Signal shutdown to subscriptions, queues and processors
    ///
    /// Returns without waiting; background tasks may still be finishing their
    /// current item. Use [`Watcher::join`] to wait for them.
    pub fn stop(&self) {
        self.cancel_token.cancel();
        for queue in &self.queues {
            queue.stop();
            queue.processor().stop();
        }
        info!("Watcher stopped");
    }

    /// Wait up to `timeout` for queue consumers to exit
    pub async fn join(&mut self, timeout: Duration) {
        let handles = std::mem::take(&mut self.handles);
        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            warn!(timeout = ?timeout, "Relay queues still busy after shutdown timeout");
        }
    }

    #[must_use]
    pub fn queues(&self) -> &[Arc<RelayQueue>] {
        &self.queues
    }
}
