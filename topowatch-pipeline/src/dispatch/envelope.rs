//! CloudEvents-shaped envelope sent for every change

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub const SPEC_VERSION: &str = "1.0";
pub const EVENT_TYPE: &str = "KUBERNETES_TOPOLOGY_CHANGE";
pub const CONTENT_TYPE: &str = "application/json";

/// Outbound message; borrows the object bodies from the event being sent
#[derive(Debug, Serialize)]
pub struct CloudEventMessage<'a> {
    pub specversion: &'static str,
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub source: &'a str,
    pub subject: String,
    pub id: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: &'static str,
    pub data: CloudEventData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudEventData<'a> {
    pub operation: &'static str,
    pub kind: &'a str,
    pub cluster_uid: &'a str,
    pub description: String,
    pub api_version: &'a str,
    pub obj: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_obj: Option<&'a Value>,
}
