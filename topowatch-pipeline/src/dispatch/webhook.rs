//! Webhook delivery of change notifications
//!
//! One POST per event, no retry. A failed delivery is logged and the event is
//! gone; the relay queue consumer is held up for at most one request timeout.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use topowatch_core::config::WebhookConfig;
use topowatch_core::models::{ChangeEvent, DeletedState, WatchedObject};
use tracing::{error, info, warn};

use super::envelope::{CloudEventData, CloudEventMessage, CONTENT_TYPE, EVENT_TYPE, SPEC_VERSION};
use crate::error::{Error, Result};
use crate::processor::EventProcessor;

pub struct WebhookDispatcher {
    client: Client,
    url: String,
    source: String,
    cluster_uid: String,
    start_time: i64,
    counter: AtomicU64,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            source: config.source.clone(),
            cluster_uid: config.cluster_uid.clone(),
            start_time: Utc::now().timestamp(),
            counter: AtomicU64::new(0),
        })
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.start_time)
    }

    /// Build the envelope for `event`
    ///
    /// A delete with unknown final state is sent as a plain delete of its last
    /// known state; without one there is nothing to send.
    pub fn prepare_message<'a>(&'a self, event: &'a ChangeEvent) -> Result<CloudEventMessage<'a>> {
        let (object, prior) = match event {
            ChangeEvent::Added { object } => (object, None),
            ChangeEvent::Updated { prior, object } => (object, prior.as_ref()),
            ChangeEvent::Deleted {
                state: DeletedState::Final(object),
            } => (object, None),
            ChangeEvent::Deleted {
                state: DeletedState::FinalStateUnknown { key, last_known },
            } => {
                warn!(key = %key, "Got delete with unknown final state in webhook dispatcher");
                let object = last_known
                    .as_ref()
                    .ok_or_else(|| Error::MissingObject(key.clone()))?;
                (object, None)
            }
        };

        let operation = event.kind().operation();
        Ok(CloudEventMessage {
            specversion: SPEC_VERSION,
            event_type: EVENT_TYPE,
            source: &self.source,
            subject: object.key().to_string(),
            id: self.next_id(),
            time: Utc::now(),
            datacontenttype: CONTENT_TYPE,
            data: CloudEventData {
                operation,
                kind: object.kind(),
                cluster_uid: &self.cluster_uid,
                description: describe(operation, object),
                api_version: object.api_version(),
                obj: object.body(),
                old_obj: prior.map(|prior| prior.body().as_ref()),
            },
        })
    }

    /// Deliver `event` with a single attempt
    pub async fn dispatch(&self, event: &ChangeEvent) -> Result<()> {
        let message = self.prepare_message(event)?;

        info!(
            operation = message.data.operation,
            subject = %message.subject,
            id = %message.id,
            "Dispatching change notification"
        );

        self.client
            .post(&self.url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn describe(operation: &str, object: &WatchedObject) -> String {
    match object.namespace() {
        Some(namespace) => format!("{operation} {} {namespace}/{}", object.kind(), object.name()),
        None => format!("{operation} {} {}", object.kind(), object.name()),
    }
}

#[async_trait]
impl EventProcessor for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook-dispatcher"
    }

    async fn process(&self, event: ChangeEvent) {
        match self.dispatch(&event).await {
            Ok(()) => info!(destination = %self.url, "message sent successfully"),
            Err(e) => error!(
                destination = %self.url,
                key = %event.describe_key(),
                error = %e,
                "Error posting message"
            ),
        }
    }
}
