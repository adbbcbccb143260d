// Module: dispatch

pub mod envelope;
pub mod webhook;

pub use envelope::{CloudEventData, CloudEventMessage};
pub use webhook::WebhookDispatcher;
