//! Change-event pipeline: relay queues, the reference-tracking cache, webhook
//! dispatch and the watcher that ties subscriptions to them.

pub mod cache;
pub mod dispatch;
pub mod error;
pub mod processor;
pub mod relay;
pub mod watcher;

#[cfg(test)]
mod test_helpers;

pub use cache::ReferenceCache;
pub use dispatch::WebhookDispatcher;
pub use error::{Error, Result};
pub use processor::{EventProcessor, Fanout};
pub use relay::RelayQueue;
pub use watcher::{SyncReport, Watcher};
