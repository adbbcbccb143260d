//! Reference-tracking cache
//!
//! Keeps the last seen snapshot of every recently observed object and reports
//! owner-reference churn between successive versions as log signals. Nothing
//! here acts on a diff beyond reporting it.
//!
//! Snapshots are shared with every other observer of the same subscription, so
//! they are stored as-is behind an `Arc` and never modified.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use topowatch_core::config::CacheConfig;
use topowatch_core::models::{ChangeEvent, DeletedState, ObjectKey, WatchedObject};
use tracing::{debug, error, info, warn};

use super::owner_refs::{reference_keys, OwnerReferenceDiff};
use super::ttl_store::TtlStore;
use crate::error::Result;
use crate::processor::EventProcessor;

/// What a single [`ReferenceCache::observe`] call found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Diff against the previous snapshot, when there was one
    pub diff: Option<OwnerReferenceDiff>,
    /// The object carries more than one owner reference
    pub multiple_owners: bool,
    /// Delete without final state; nothing was compared or stored
    pub skipped: bool,
    /// Number of warnings logged for this event
    pub warnings: usize,
}

impl Observation {
    /// References were added or removed
    #[must_use]
    pub fn has_churn(&self) -> bool {
        self.diff.as_ref().is_some_and(|diff| !diff.is_empty())
    }
}

pub struct ReferenceCache {
    store: Arc<TtlStore<String, Arc<WatchedObject>>>,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ReferenceCache {
    #[must_use]
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            store: Arc::new(TtlStore::new(ttl)),
            sweep_interval,
            cancel_token: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.sweep_interval())
    }

    /// Compare the event's object against its cached snapshot and store it.
    ///
    /// Deletes with a known final state are stored too; the TTL keeps them
    /// around for a grace period instead of dropping them immediately.
    pub fn observe(&self, event: &ChangeEvent) -> Observation {
        let mut observation = Observation::default();

        let Some(object) = event.object() else {
            if let ChangeEvent::Deleted {
                state: DeletedState::FinalStateUnknown { key, .. },
            } = event
            {
                warn!(key = %key, "Ignoring delete with unknown final state in reference cache");
            }
            observation.skipped = true;
            observation.warnings = 1;
            return observation;
        };

        let key = object.key().to_string();

        if object.owner_references().len() > 1 {
            warn!(
                key = %key,
                owners = ?reference_keys(object.owner_references()),
                "Object has more than one owner reference"
            );
            observation.multiple_owners = true;
            observation.warnings += 1;
        }

        match self.lookup(&key) {
            Ok(Some(prior)) => {
                observation.diff = Some(Self::compare(&key, &prior, object, &mut observation.warnings));
            }
            Ok(None) => {}
            Err(e) => {
                // store faults count as a miss
                error!(key = %key, error = %e, "Error getting last cached object");
            }
        }

        self.store.insert(key, Arc::clone(object));
        observation
    }

    fn compare(
        key: &str,
        old: &WatchedObject,
        new: &WatchedObject,
        warnings: &mut usize,
    ) -> OwnerReferenceDiff {
        let old_refs = old.owner_references();
        let new_refs = new.owner_references();

        if !old_refs.is_empty() || !new_refs.is_empty() {
            info!(
                key = %key,
                old = ?reference_keys(old_refs),
                new = ?reference_keys(new_refs),
                "Owner references"
            );
        }

        let diff = OwnerReferenceDiff::between(old_refs, new_refs);
        if !diff.removed.is_empty() {
            warn!(key = %key, removed = ?reference_keys(&diff.removed), "There are removed owner references");
            *warnings += 1;
        }
        if !diff.added.is_empty() {
            warn!(key = %key, added = ?reference_keys(&diff.added), "There are added owner references");
            *warnings += 1;
        }
        diff
    }

    /// Snapshot stored under `group/version/kind/namespace/name`
    ///
    /// Errors when the key is not a well-formed identity.
    pub fn lookup(&self, key: &str) -> Result<Option<Arc<WatchedObject>>> {
        key.parse::<ObjectKey>()?;
        Ok(self.store.get(key))
    }

    /// Cached snapshots of the objects `object` names as owners
    ///
    /// Owners live in the child's namespace or are cluster-scoped; both are
    /// tried. References with no cached snapshot are left out.
    pub fn resolve_owners(&self, object: &WatchedObject) -> Vec<Arc<WatchedObject>> {
        let namespace = object.namespace().unwrap_or_default();
        object
            .owner_references()
            .iter()
            .filter_map(|reference| {
                let namespaced = ObjectKey::for_owner(reference, namespace).to_string();
                self.store.get(namespaced.as_str()).or_else(|| {
                    let cluster = ObjectKey::for_owner(reference, "").to_string();
                    self.store.get(cluster.as_str())
                })
            })
            .collect()
    }

    /// Reclaim every expired entry now
    pub fn sweep(&self) -> usize {
        let purged = self.store.purge_expired();
        if purged > 0 {
            debug!(purged = purged, remaining = self.store.len(), "Reference cache sweep");
        }
        purged
    }

    /// Start the periodic sweep. Calling it again while running is a no-op.
    ///
    /// Entries are otherwise only reclaimed when read, so objects that stop
    /// changing would never leave the cache without this.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            warn!("Reference cache sweeper already running");
            return;
        }

        let store = Arc::clone(&self.store);
        let cancel_token = self.cancel_token.clone();
        let mut timer = interval(self.sweep_interval);

        *sweeper = Some(tokio::spawn(async move {
            // the first tick completes immediately
            timer.tick().await;
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Reference cache sweeper shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            debug!(purged = purged, remaining = store.len(), "Reference cache sweep");
                        }
                    }
                }
            }
        }));
    }

    /// Halt the periodic sweep
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Stored entries, including expired ones not yet reclaimed
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl EventProcessor for ReferenceCache {
    fn name(&self) -> &str {
        "reference-cache"
    }

    async fn process(&self, event: ChangeEvent) {
        self.observe(&event);
    }

    fn start(&self) {
        self.start_sweeper();
    }

    fn stop(&self) {
        ReferenceCache::stop(self);
    }
}
