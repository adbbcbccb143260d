// Module: watcher

pub mod manager;
pub mod provider;

pub use manager::{SyncReport, Watcher};
pub use provider::{ResourceEventHandler, Subscription, WatchProvider};
