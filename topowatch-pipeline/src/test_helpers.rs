//! Shared fixtures for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use topowatch_core::models::{ChangeEvent, DeletedState, ResourceType, WatchedObject};

use crate::error::{Error, Result};
use crate::processor::EventProcessor;
use crate::watcher::{ResourceEventHandler, Subscription, WatchProvider};

pub const OWNER_API_VERSION: &str = "apps/v1";

/// Minimal `apps/v1` document in the `default` namespace owned by ReplicaSets
pub fn object(kind: &str, name: &str, owners: &[&str]) -> Value {
    let mut metadata = json!({
        "name": name,
        "namespace": "default",
    });
    if !owners.is_empty() {
        metadata["ownerReferences"] = owners
            .iter()
            .map(|owner| {
                json!({
                    "apiVersion": OWNER_API_VERSION,
                    "kind": "ReplicaSet",
                    "name": owner,
                })
            })
            .collect();
    }
    json!({
        "apiVersion": "apps/v1",
        "kind": kind,
        "metadata": metadata,
        "spec": {"replicas": 1},
    })
}

pub fn watched(kind: &str, name: &str, owners: &[&str]) -> Arc<WatchedObject> {
    Arc::new(WatchedObject::from_value(object(kind, name, owners)).unwrap())
}

pub fn added(kind: &str, name: &str, owners: &[&str]) -> ChangeEvent {
    ChangeEvent::Added {
        object: watched(kind, name, owners),
    }
}

pub fn updated(kind: &str, name: &str, old_owners: &[&str], new_owners: &[&str]) -> ChangeEvent {
    ChangeEvent::Updated {
        prior: Some(watched(kind, name, old_owners)),
        object: watched(kind, name, new_owners),
    }
}

pub fn deleted(kind: &str, name: &str, owners: &[&str]) -> ChangeEvent {
    ChangeEvent::Deleted {
        state: DeletedState::Final(watched(kind, name, owners)),
    }
}

pub fn degraded_delete(key: &str) -> ChangeEvent {
    ChangeEvent::Deleted {
        state: DeletedState::FinalStateUnknown {
            key: key.to_string(),
            last_known: None,
        },
    }
}

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Forwards every processed event to a channel and records lifecycle calls
pub struct RecordingProcessor {
    name: String,
    tx: mpsc::UnboundedSender<ChangeEvent>,
    delay: Option<Duration>,
    last_seen: AtomicU64,
    lifecycle: Mutex<Vec<&'static str>>,
}

impl RecordingProcessor {
    pub fn new(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<ChangeEvent>) {
        Self::build(name, None)
    }

    /// Sleeps for `delay` before recording each event
    pub fn with_delay(name: &str, delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<ChangeEvent>) {
        Self::build(name, Some(delay))
    }

    fn build(name: &str, delay: Option<Duration>) -> (Arc<Self>, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let processor = Arc::new(Self {
            name: name.to_string(),
            tx,
            delay,
            last_seen: AtomicU64::new(0),
            lifecycle: Mutex::new(Vec::new()),
        });
        (processor, rx)
    }

    /// Both processors saw an event and this one saw its most recent first
    pub fn seen_before(&self, other: &Self) -> bool {
        let mine = self.last_seen.load(Ordering::SeqCst);
        let theirs = other.last_seen.load(Ordering::SeqCst);
        mine != 0 && theirs != 0 && mine < theirs
    }

    pub fn lifecycle(&self) -> Vec<&'static str> {
        self.lifecycle.lock().clone()
    }
}

#[async_trait]
impl EventProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: ChangeEvent) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.last_seen
            .store(SEQUENCE.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        let _ = self.tx.send(event);
    }

    fn start(&self) {
        self.lifecycle.lock().push("start");
    }

    fn stop(&self) {
        self.lifecycle.lock().push("stop");
    }
}

type Shutdowns = Arc<Mutex<HashMap<ResourceType, CancellationToken>>>;

/// In-memory provider that knows a fixed set of resource types
///
/// Tests drive notifications through [`FakeWatchProvider::handler`].
pub struct FakeWatchProvider {
    known: HashSet<ResourceType>,
    never_sync: HashSet<ResourceType>,
    handlers: Mutex<HashMap<ResourceType, Arc<dyn ResourceEventHandler>>>,
    shutdowns: Shutdowns,
}

impl FakeWatchProvider {
    pub fn new(known: impl IntoIterator<Item = ResourceType>) -> Self {
        Self {
            known: known.into_iter().collect(),
            never_sync: HashSet::new(),
            handlers: Mutex::new(HashMap::new()),
            shutdowns: Arc::default(),
        }
    }

    /// Subscriptions for `resource` never report initial sync
    pub fn never_sync(mut self, resource: ResourceType) -> Self {
        self.never_sync.insert(resource);
        self
    }

    pub fn handler(&self, resource: &ResourceType) -> Arc<dyn ResourceEventHandler> {
        Arc::clone(&self.handlers.lock()[resource])
    }

    /// The subscription for `resource` was started and has since been shut down
    pub fn cancelled(&self, resource: &ResourceType) -> bool {
        self.shutdowns
            .lock()
            .get(resource)
            .is_some_and(CancellationToken::is_cancelled)
    }
}

#[async_trait]
impl WatchProvider for FakeWatchProvider {
    async fn subscribe(
        &self,
        resource: &ResourceType,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Result<Box<dyn Subscription>> {
        if !self.known.contains(resource) {
            return Err(Error::Subscription {
                resource: resource.to_string(),
                reason: "the server could not find the requested resource".to_string(),
            });
        }
        self.handlers.lock().insert(resource.clone(), handler);

        let (synced, _) = watch::channel(false);
        Ok(Box::new(FakeSubscription {
            resource: resource.clone(),
            synced,
            auto_sync: !self.never_sync.contains(resource),
            shutdowns: Arc::clone(&self.shutdowns),
        }))
    }
}

struct FakeSubscription {
    resource: ResourceType,
    synced: watch::Sender<bool>,
    auto_sync: bool,
    shutdowns: Shutdowns,
}

impl Subscription for FakeSubscription {
    fn resource(&self) -> &ResourceType {
        &self.resource
    }

    fn start(&self, shutdown: CancellationToken) {
        self.shutdowns.lock().insert(self.resource.clone(), shutdown);
        if self.auto_sync {
            self.synced.send_replace(true);
        }
    }

    fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }
}
