//! Local object store behind one resource subscription
//!
//! Mirrors what the API server last told us about every object so that updates
//! carry the prior state, and objects that vanish while the watch was broken
//! are still reported as deletes once the relist completes.

use std::collections::HashMap;
use topowatch_core::models::{DeleteNotice, RawObject};
use topowatch_pipeline::watcher::ResourceEventHandler;

/// Watch stream event with its object already converted to a raw document
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A (re)list started
    Init,
    /// An object seen during a (re)list
    InitApply { key: String, object: RawObject },
    /// The (re)list is complete
    InitDone,
    /// An object was created or modified
    Apply { key: String, object: RawObject },
    /// An object was deleted
    Delete { key: String, object: RawObject },
}

#[derive(Debug, Default)]
pub struct InformerStore {
    objects: HashMap<String, RawObject>,
    relist: Option<HashMap<String, RawObject>>,
}

impl InformerStore {
    /// Apply one event, notifying `handler` of the resulting changes
    ///
    /// Returns `true` when the event completes a list.
    pub fn handle(&mut self, event: StoreEvent, handler: &dyn ResourceEventHandler) -> bool {
        match event {
            StoreEvent::Init => {
                self.relist = Some(HashMap::new());
                false
            }
            StoreEvent::InitApply { key, object } => {
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(key, object);
                false
            }
            StoreEvent::InitDone => {
                self.replace(handler);
                true
            }
            StoreEvent::Apply { key, object } => {
                self.apply(key, object, handler);
                false
            }
            StoreEvent::Delete { key, object } => {
                self.objects.remove(&key);
                handler.on_delete(DeleteNotice::Object(object));
                false
            }
        }
    }

    fn apply(&mut self, key: String, object: RawObject, handler: &dyn ResourceEventHandler) {
        match self.objects.insert(key, RawObject::clone(&object)) {
            Some(old) => handler.on_update(old, object),
            None => handler.on_add(object),
        }
    }

    /// Swap in the listed objects; anything we held that the list no longer has
    /// was deleted while we were not watching.
    fn replace(&mut self, handler: &dyn ResourceEventHandler) {
        let listed = self.relist.take().unwrap_or_default();

        let gone: Vec<String> = self
            .objects
            .keys()
            .filter(|key| !listed.contains_key(*key))
            .cloned()
            .collect();
        for key in gone {
            let last_known = self.objects.remove(&key);
            handler.on_delete(DeleteNotice::FinalStateUnknown { key, last_known });
        }

        for (key, object) in listed {
            self.apply(key, object, handler);
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }
}
