// Module: relay

pub mod item;
pub mod queue;

pub use item::RelayItem;
pub use queue::{QueueMetrics, RelayQueue};
