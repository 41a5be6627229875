use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{AttributionOutcome, AttributionRecord, Counters, DailyMetric, TenantId};

/// Emitted after a delta has been merged into a daily aggregate. `counters` holds the post-merge values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdatedEvent {
    pub tenant_id: TenantId,
    pub metric_type: String,
    pub date: NaiveDate,
    pub source: String,
    pub counters: Counters,
    /// Number of merges into the row before this one. Strictly increases per row.
    pub merge_count: i64,
    pub timestamp: DateTime<Utc>,
}

impl MetricUpdatedEvent {
    pub fn new(metric: &DailyMetric) -> Self {
        Self {
            tenant_id: metric.tenant_id.clone(),
            metric_type: metric.metric_type.clone(),
            date: metric.metric_date,
            source: metric.source.clone(),
            counters: metric.counters.clone(),
            merge_count: metric.merge_count,
            timestamp: metric.updated_at,
        }
    }
}

/// Emitted after every ledger write, including writes that were ignored because the order already had a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecordedEvent {
    pub tenant_id: TenantId,
    pub order_id: String,
    pub channel: String,
    pub outcome: AttributionOutcome,
}

impl AttributionRecordedEvent {
    pub fn new(record: &AttributionRecord, outcome: AttributionOutcome) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            order_id: record.order_id.clone(),
            channel: record.channel.clone(),
            outcome,
        }
    }
}
