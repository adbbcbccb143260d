//! Processing seam between the relay queue consumer and the components that
//! act on change events

use async_trait::async_trait;
use std::sync::Arc;
use topowatch_core::models::ChangeEvent;

/// Handler invoked by a relay queue consumer, one event at a time
///
/// `process` runs on the single consumer task, so a slow implementation holds
/// up every resource type sharing the queue.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, event: ChangeEvent);

    /// Start background work owned by the processor
    fn start(&self) {}

    /// Stop background work; in-flight `process` calls are left to finish
    fn stop(&self) {}
}

/// Runs several processors for every event, in registration order
pub struct Fanout {
    name: String,
    processors: Vec<Arc<dyn EventProcessor>>,
}

impl Fanout {
    #[must_use]
    pub fn new(processors: Vec<Arc<dyn EventProcessor>>) -> Self {
        let name = processors
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, processors }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[async_trait]
impl EventProcessor for Fanout {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: ChangeEvent) {
        for processor in &self.processors {
            processor.process(event.clone()).await;
        }
    }

    fn start(&self) {
        for processor in &self.processors {
            processor.start();
        }
    }

    fn stop(&self) {
        for processor in &self.processors {
            processor.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{added, RecordingProcessor};

    #[tokio::test]
    async fn test_fanout_calls_processors_in_order() {
        let (first, mut first_rx) = RecordingProcessor::new("first");
        let (second, mut second_rx) = RecordingProcessor::new("second");
        let fanout = Fanout::new(vec![first.clone() as Arc<dyn EventProcessor>, second.clone()]);

        assert_eq!(fanout.name(), "first+second");
        assert_eq!(fanout.len(), 2);

        fanout.process(added("Deployment", "web", &[])).await;

        assert_eq!(first_rx.recv().await.unwrap().describe_key(), "apps/v1/Deployment/default/web");
        assert_eq!(second_rx.recv().await.unwrap().describe_key(), "apps/v1/Deployment/default/web");
        assert!(first.seen_before(&second));
    }

    #[tokio::test]
    async fn test_fanout_propagates_lifecycle() {
        let (first, _rx1) = RecordingProcessor::new("first");
        let (second, _rx2) = RecordingProcessor::new("second");
        let fanout = Fanout::new(vec![first.clone() as Arc<dyn EventProcessor>, second.clone()]);

        fanout.start();
        fanout.stop();

        assert_eq!(first.lifecycle(), vec!["start", "stop"]);
        assert_eq!(second.lifecycle(), vec!["start", "stop"]);
    }
}
