//! §3 `EventEnvelope` and the CloudEvents fields the relay injects at
//! publish time (§4.8: "`specversion=1.0`, `source=/oms`,
//! `datacontenttype=application/json`").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source_service: String,
    pub source_version: String,
    pub source_commit: Option<String>,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub sequence: Option<u64>,
    pub payload: serde_json::Value,
    pub idempotency_token: Option<String>,
    #[serde(default = "specversion")]
    pub specversion: String,
    #[serde(default = "source")]
    pub source: String,
    #[serde(default = "datacontenttype")]
    pub datacontenttype: String,
}

fn specversion() -> String {
    "1.0".to_string()
}

fn source() -> String {
    "/oms".to_string()
}

fn datacontenttype() -> String {
    "application/json".to_string()
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, source_service: impl Into<String>, source_version: impl Into<String>, correlation_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            version: 1,
            created_at: Utc::now(),
            expires_at: None,
            source_service: source_service.into(),
            source_version: source_version.into(),
            source_commit: None,
            correlation_id: correlation_id.into(),
            causation_id: None,
            sequence: None,
            payload,
            idempotency_token: None,
            specversion: specversion(),
            source: source(),
            datacontenttype: datacontenttype(),
        }
    }

    /// `oms.<aggregate>.<type>.<branch>` (§4.8).
    pub fn stream_name(aggregate: &str, event_type: &str, branch: &str) -> String {
        format!("oms.{aggregate}.{event_type}.{branch}")
    }
}
