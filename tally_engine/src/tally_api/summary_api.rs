//! Read-only analytics queries.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{counter_names, metric_types, DailyMetric, TenantId},
    tally_api::summary_objects::{AssistantContext, ChannelSummary, Summary, TimeRange, TimeWindow},
    traits::{AnalyticsError, AttributionManagement, MetricManagement},
};

/// `SummaryApi` turns the stored aggregates and ledger rows into tenant summaries. It never writes.
pub struct SummaryApi<B> {
    db: B,
}

impl<B: Debug> Debug for SummaryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SummaryApi ({:?})", self.db)
    }
}

impl<B: Clone> Clone for SummaryApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> SummaryApi<B>
where B: MetricManagement + AttributionManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Summarises a tenant's revenue and per-channel performance over `window`.
    ///
    /// Totals come from the `revenue` daily aggregates whose day overlaps the window. Per-channel figures come from the
    /// ledger rows whose order date lies inside it. A tenant with no data gets an all-zero summary.
    pub async fn summarize(&self, tenant: &TenantId, window: &TimeWindow) -> Result<Summary, AnalyticsError> {
        let totals = self.db.fetch_counter_totals(tenant, metric_types::REVENUE, window).await?;
        let channels = self.db.fetch_channel_totals(tenant, window).await?;
        let total_revenue = totals.get(counter_names::REVENUE);
        #[allow(clippy::cast_possible_truncation)]
        let total_orders = totals.get(counter_names::ORDERS).round() as i64;
        let per_channel = channels.into_iter().map(ChannelSummary::from).collect::<Vec<_>>();
        trace!(
            "📊️ Summary for {tenant}: {total_revenue:.2} over {total_orders} orders in {} channels",
            per_channel.len()
        );
        Ok(Summary::new(tenant.clone(), *window, total_revenue, total_orders).with_channels(per_channel))
    }

    /// Summarises the `range` that ends now.
    pub async fn summarize_range(&self, tenant: &TenantId, range: TimeRange) -> Result<Summary, AnalyticsError> {
        self.summarize(tenant, &range.window_ending_now()).await
    }

    /// The stored daily rows of one metric type, from every source, ordered by day.
    pub async fn daily_metrics(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        window: &TimeWindow,
    ) -> Result<Vec<DailyMetric>, AnalyticsError> {
        if metric_type.trim().is_empty() {
            return Err(AnalyticsError::ValidationError("A metric type is required".into()));
        }
        self.db.fetch_daily_metrics(tenant, metric_type, window).await
    }

    pub async fn assistant_context(
        &self,
        tenant: &TenantId,
        range: TimeRange,
    ) -> Result<AssistantContext, AnalyticsError> {
        let summary = self.summarize_range(tenant, range).await?;
        Ok(summary.assistant_context(range))
    }
}
