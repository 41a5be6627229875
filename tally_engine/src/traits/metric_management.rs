use chrono::NaiveDate;

use crate::{
    db_types::{Counters, DailyMetric, MetricDelta, TenantId},
    tally_api::summary_objects::TimeWindow,
    traits::AnalyticsError,
};

/// The `MetricManagement` trait defines behaviour for storing daily metric aggregates.
///
/// There is exactly one row per (tenant, metric type, day, source). Rows are created by the first merge that targets
/// them and are never deleted by the engine.
#[allow(async_fn_in_trait)]
pub trait MetricManagement {
    /// Adds `delta` to the counters of the targeted row, creating the row if it does not exist yet, and stamps the
    /// row's last-write time. This must be atomic with respect to concurrent merges on the same key: when N merges
    /// race, the stored counters must equal the field-wise sum of all N deltas.
    ///
    /// Returns the row as it stands immediately after this merge.
    async fn merge_daily_metric(&self, delta: MetricDelta) -> Result<DailyMetric, AnalyticsError>;

    async fn fetch_daily_metric(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        date: NaiveDate,
        source: &str,
    ) -> Result<Option<DailyMetric>, AnalyticsError>;

    /// Fetches all rows of the given metric type (from every source) whose day overlaps the window, ordered by day.
    async fn fetch_daily_metrics(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        window: &TimeWindow,
    ) -> Result<Vec<DailyMetric>, AnalyticsError>;

    /// Sums every counter of the given metric type over the days that overlap the window, across all sources.
    async fn fetch_counter_totals(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        window: &TimeWindow,
    ) -> Result<Counters, AnalyticsError>;
}
