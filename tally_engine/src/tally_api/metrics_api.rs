//! The write side of the daily metric aggregates.

use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;

use crate::{
    db_types::{Counters, DailyMetric, MetricDelta, TenantId},
    events::{EventProducers, MetricUpdatedEvent},
    helpers::parse_metric_date,
    tally_api::retry::RetryPolicy,
    traits::{AnalyticsError, MetricManagement},
};

/// `MetricsApi` merges validated deltas into the per-day aggregates and notifies the metric updated hooks.
pub struct MetricsApi<B> {
    db: B,
    producers: EventProducers,
    retry: RetryPolicy,
}

impl<B> Debug for MetricsApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MetricsApi ({:?})", self.retry)
    }
}

impl<B> MetricsApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl<B> MetricsApi<B>
where B: MetricManagement
{
    /// Adds `delta` to the aggregate for its (tenant, metric type, day, source) key and returns the row as it stands
    /// afterwards. An empty delta still creates the row and moves its last-write time forward.
    ///
    /// Busy-store failures are retried according to the configured [`RetryPolicy`] before being returned.
    pub async fn merge_daily_metric(&self, delta: MetricDelta) -> Result<DailyMetric, AnalyticsError> {
        validate_delta(&delta)?;
        let db = &self.db;
        let delta = &delta;
        let metric = self.retry.run("Metric merge", move || db.merge_daily_metric(delta.clone())).await?;
        debug!(
            "📈️ Merged {} counters into {}/{}/{}/{}",
            delta.delta.len(),
            delta.tenant_id,
            delta.metric_type,
            delta.date,
            delta.source
        );
        self.producers.publish_metric_updated(MetricUpdatedEvent::new(&metric));
        Ok(metric)
    }

    /// As [`Self::merge_daily_metric`], but takes the date as it arrives from an adapter. Timestamps are truncated to
    /// their UTC calendar day.
    pub async fn merge_daily_metric_at(
        &self,
        tenant: TenantId,
        metric_type: &str,
        date: &str,
        source: &str,
        delta: Counters,
    ) -> Result<DailyMetric, AnalyticsError> {
        let date = parse_metric_date(date)?;
        self.merge_daily_metric(MetricDelta::new(tenant, metric_type, date, source, delta)).await
    }

    pub async fn fetch_daily_metric(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        date: NaiveDate,
        source: &str,
    ) -> Result<Option<DailyMetric>, AnalyticsError> {
        self.db.fetch_daily_metric(tenant, metric_type, date, source).await
    }
}

/// Checks the parts of a delta that the store cannot check for itself.
pub fn validate_delta(delta: &MetricDelta) -> Result<(), AnalyticsError> {
    if delta.tenant_id.is_empty() {
        return Err(AnalyticsError::ValidationError("A tenant id is required".into()));
    }
    if delta.metric_type.trim().is_empty() {
        return Err(AnalyticsError::ValidationError("A metric type is required".into()));
    }
    if delta.source.trim().is_empty() {
        return Err(AnalyticsError::ValidationError("A metric source is required".into()));
    }
    for (name, value) in delta.delta.iter() {
        if name.trim().is_empty() {
            return Err(AnalyticsError::ValidationError("Counter names cannot be empty".into()));
        }
        if !value.is_finite() {
            return Err(AnalyticsError::ValidationError(format!("Counter {name} has a non-finite value ({value})")));
        }
    }
    Ok(())
}
