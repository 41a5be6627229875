use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    broadcast::ConnectionId,
    db_types::Counters,
    events::MetricUpdatedEvent,
    tally_api::summary_objects::Summary,
};

/// The full post-merge counters of one daily row. Pushes for the same row can arrive out of order, so clients keep the
/// one with the highest `mergeCount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricUpdateData {
    pub date: NaiveDate,
    pub source: String,
    pub counters: Counters,
    pub merge_count: i64,
}

/// A message pushed to a live connection. Serialized with its kind in the `event` field, e.g.
/// `{"event": "metric:update", "metricType": "revenue", "data": {..}, "timestamp": ".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PushMessage {
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    #[serde(rename = "metric:update", rename_all = "camelCase")]
    MetricUpdate { metric_type: String, data: MetricUpdateData, timestamp: DateTime<Utc> },
    #[serde(rename = "analytics:update")]
    AnalyticsUpdate { summary: Summary },
    #[serde(rename = "error")]
    Error { message: String },
}

impl PushMessage {
    /// The value of the `event` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            PushMessage::Connected { .. } => "connected",
            PushMessage::MetricUpdate { .. } => "metric:update",
            PushMessage::AnalyticsUpdate { .. } => "analytics:update",
            PushMessage::Error { .. } => "error",
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::Error { message: message.into() }
    }
}

impl From<&MetricUpdatedEvent> for PushMessage {
    fn from(event: &MetricUpdatedEvent) -> Self {
        Self::MetricUpdate {
            metric_type: event.metric_type.clone(),
            data: MetricUpdateData {
                date: event.date,
                source: event.source.clone(),
                counters: event.counters.clone(),
                merge_count: event.merge_count,
            },
            timestamp: event.timestamp,
        }
    }
}

impl From<Summary> for PushMessage {
    fn from(summary: Summary) -> Self {
        Self::AnalyticsUpdate { summary }
    }
}
