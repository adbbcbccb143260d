//! Boundary with the external watch provider
//!
//! The provider owns the registry connection, the list/watch protocol and its
//! own object store. The pipeline only sees per-object notifications and a
//! signal telling it when the initial list has been delivered.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use topowatch_core::models::{DeleteNotice, RawObject, ResourceType};

use crate::error::Result;

/// Callbacks invoked by a subscription for every change
///
/// Implementations must return almost immediately; the provider calls them
/// inline with its own delivery loop.
pub trait ResourceEventHandler: Send + Sync {
    fn on_add(&self, object: RawObject);

    fn on_update(&self, old: RawObject, new: RawObject);

    fn on_delete(&self, notice: DeleteNotice);
}

/// A live interest in one resource type
pub trait Subscription: Send + Sync {
    fn resource(&self) -> &ResourceType;

    /// Begin delivering notifications until `shutdown` is cancelled
    fn start(&self, shutdown: CancellationToken);

    /// Flips to `true` once the initial list has been delivered
    fn synced(&self) -> watch::Receiver<bool>;
}

/// Resolves resource types into subscriptions
#[async_trait]
pub trait WatchProvider: Send + Sync {
    /// Fails when the resource type cannot be resolved or watched
    async fn subscribe(
        &self,
        resource: &ResourceType,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Result<Box<dyn Subscription>>;
}
