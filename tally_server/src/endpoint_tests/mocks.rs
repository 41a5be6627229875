use chrono::{NaiveDate, Utc};
use mockall::mock;
use serde_json::json;
use tally_engine::{
    db_types::{
        AttributionOutcome,
        AttributionRecord,
        ChannelTotals,
        ConflictPolicy,
        Counters,
        DailyMetric,
        MetricDelta,
        NewAttribution,
        TenantId,
    },
    summary_objects::TimeWindow,
    traits::{AnalyticsError, AttributionManagement, MetricManagement},
};

mock! {
    pub Store {}
    impl MetricManagement for Store {
        async fn merge_daily_metric(&self, delta: MetricDelta) -> Result<DailyMetric, AnalyticsError>;
        async fn fetch_daily_metric(&self, tenant: &TenantId, metric_type: &str, date: NaiveDate, source: &str) -> Result<Option<DailyMetric>, AnalyticsError>;
        async fn fetch_daily_metrics(&self, tenant: &TenantId, metric_type: &str, window: &TimeWindow) -> Result<Vec<DailyMetric>, AnalyticsError>;
        async fn fetch_counter_totals(&self, tenant: &TenantId, metric_type: &str, window: &TimeWindow) -> Result<Counters, AnalyticsError>;
    }
    impl AttributionManagement for Store {
        async fn record_attribution(&self, record: NewAttribution, policy: ConflictPolicy) -> Result<(AttributionRecord, AttributionOutcome), AnalyticsError>;
        async fn fetch_attribution(&self, tenant: &TenantId, order_id: &str) -> Result<Option<AttributionRecord>, AnalyticsError>;
        async fn fetch_channel_totals(&self, tenant: &TenantId, window: &TimeWindow) -> Result<Vec<ChannelTotals>, AnalyticsError>;
    }
}

/// The row a fresh store would hold after merging `delta`.
pub fn stored_metric(delta: MetricDelta) -> DailyMetric {
    let now = Utc::now();
    DailyMetric {
        id: 1,
        tenant_id: delta.tenant_id,
        metric_type: delta.metric_type,
        metric_date: delta.date,
        source: delta.source,
        counters: delta.delta,
        merge_count: 0,
        created_at: now,
        updated_at: now,
    }
}

pub fn stored_attribution(record: NewAttribution, revision: i64) -> AttributionRecord {
    let now = Utc::now();
    serde_json::from_value(json!({
        "id": 1,
        "tenant_id": record.tenant_id,
        "order_id": record.order_id,
        "channel": record.channel,
        "campaign_id": record.campaign_id,
        "ad_set_id": record.ad_set_id,
        "ad_id": record.ad_id,
        "revenue": record.revenue,
        "cost": record.cost,
        "attribution_model": record.attribution_model,
        "order_date": record.order_date,
        "metadata": record.metadata,
        "revision": revision,
        "created_at": now,
        "updated_at": now,
    }))
    .unwrap()
}
