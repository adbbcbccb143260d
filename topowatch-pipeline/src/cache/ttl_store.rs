//! Key-value store with a fixed time-to-live
//!
//! Entries are valid from insertion until insertion + TTL. Expired entries are
//! reclaimed lazily when a read finds them, or in bulk by [`TtlStore::purge_expired`],
//! which the owner runs on a timer so entries nobody reads again still go away.
//! Both paths go through the same sharded map locks.

use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct TtlEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> TtlEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct TtlStore<K, V> {
    entries: DashMap<K, TtlEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or overwrite, restarting the entry's TTL
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        self.entries.insert(
            key,
            TtlEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Live value for `key`; an expired entry is removed and reported missing
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Scan the whole store and drop every expired entry; returns how many
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    /// Number of stored entries, including expired ones not yet reclaimed
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
