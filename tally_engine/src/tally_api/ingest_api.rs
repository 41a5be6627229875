//! Folds adapter records into metric merges and ledger writes.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{metric_types, AttributionOutcome, DailyMetric, MetricDelta, TenantId},
    events::EventProducers,
    helpers::parse_metric_date,
    tally_api::{
        attribution_api::AttributionApi,
        errors::IngestError,
        ingest_objects::{AdInsight, EmailMetrics, StorefrontOrder, SyncReport, STOREFRONT_SOURCE},
        metrics_api::MetricsApi,
        retry::RetryPolicy,
    },
    traits::{AttributionManagement, MetricManagement},
};

/// The result of ingesting a single storefront order.
#[derive(Debug, Clone)]
pub struct IngestedOrder {
    pub metric: DailyMetric,
    /// `None` if the order carried nothing to attribute it with.
    pub attribution: Option<AttributionOutcome>,
}

pub struct IngestApi<B> {
    metrics: MetricsApi<B>,
    attributions: AttributionApi<B>,
}

impl<B> Debug for IngestApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IngestApi")
    }
}

impl<B> IngestApi<B> {
    pub fn from_parts(metrics: MetricsApi<B>, attributions: AttributionApi<B>) -> Self {
        Self { metrics, attributions }
    }
}

impl<B: Clone> IngestApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let metrics = MetricsApi::new(db.clone(), producers.clone());
        let attributions = AttributionApi::new(db, producers);
        Self::from_parts(metrics, attributions)
    }

    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        Self {
            metrics: self.metrics.with_retry_policy(retry),
            attributions: self.attributions.with_retry_policy(retry),
        }
    }
}

impl<B> IngestApi<B>
where B: MetricManagement + AttributionManagement
{
    pub fn metrics(&self) -> &MetricsApi<B> {
        &self.metrics
    }

    pub fn attributions(&self) -> &AttributionApi<B> {
        &self.attributions
    }

    /// Adds the order to the tenant's storefront revenue for the order's day and, if the order carries a source
    /// name or referring site, records its attribution. A storefront order never overwrites an existing ledger row.
    ///
    /// The daily aggregate only sees deltas and knows nothing about order ids, so ingesting the same order twice adds
    /// its revenue to the day twice while the ledger keeps a single row. Re-syncs should only send new orders.
    pub async fn ingest_storefront_order(
        &self,
        tenant: &TenantId,
        order: &StorefrontOrder,
    ) -> Result<IngestedOrder, IngestError> {
        let date = order.order_day()?;
        let delta =
            MetricDelta::new(tenant.clone(), metric_types::REVENUE, date, STOREFRONT_SOURCE, order.revenue_delta()?);
        // Normalise the ledger row before writing anything, so that a bad record leaves no partial trace.
        let attribution = if order.has_attribution() { Some(order.attribution(tenant)?) } else { None };
        let metric = self.metrics.merge_daily_metric(delta).await?;
        let attribution = match attribution {
            Some(record) => {
                let (_, outcome) = self.attributions.record_attribution(record, order.conflict_policy()).await?;
                Some(outcome)
            },
            None => None,
        };
        Ok(IngestedOrder { metric, attribution })
    }

    pub async fn ingest_storefront_orders(&self, tenant: &TenantId, orders: &[StorefrontOrder]) -> SyncReport {
        let mut report = SyncReport::default();
        for order in orders {
            match self.ingest_storefront_order(tenant, order).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!("📈️ Could not ingest order {} for {tenant}. {e}", order.order_id);
                    report.failed += 1;
                },
            }
        }
        info!("📈️ Storefront sync for {tenant}: {} processed, {} failed", report.processed, report.failed);
        report
    }

    /// Records the insight in the ledger under its per-ad, per-day key, adding to whatever is already there, and adds
    /// `{spend, revenue, conversions}` to the tenant's ad spend aggregate for the platform and day.
    pub async fn ingest_ad_insight(&self, tenant: &TenantId, insight: &AdInsight) -> Result<DailyMetric, IngestError> {
        let record = insight.attribution(tenant)?;
        let delta = MetricDelta::new(
            tenant.clone(),
            metric_types::AD_SPEND,
            insight.day()?,
            insight.channel(),
            insight.spend_delta()?,
        );
        self.attributions.record_attribution(record, insight.conflict_policy()).await?;
        let metric = self.metrics.merge_daily_metric(delta).await?;
        Ok(metric)
    }

    pub async fn ingest_ad_insights(&self, tenant: &TenantId, insights: &[AdInsight]) -> SyncReport {
        let mut report = SyncReport::default();
        for insight in insights {
            match self.ingest_ad_insight(tenant, insight).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!("📈️ Could not ingest {} insight for ad {} ({tenant}). {e}", insight.platform, insight.ad_id);
                    report.failed += 1;
                },
            }
        }
        info!("📈️ Ad insight sync for {tenant}: {} processed, {} failed", report.processed, report.failed);
        report
    }

    pub async fn ingest_email_metrics(
        &self,
        tenant: &TenantId,
        metrics: &EmailMetrics,
    ) -> Result<DailyMetric, IngestError> {
        let date = parse_metric_date(&metrics.date)
            .map_err(|e| IngestError::invalid(metrics.source.as_str(), e.to_string()))?;
        let counters = metrics.counters.clone();
        let delta = MetricDelta::new(tenant.clone(), metric_types::EMAIL, date, metrics.source.as_str(), counters);
        let metric = self.metrics.merge_daily_metric(delta).await?;
        Ok(metric)
    }
}
