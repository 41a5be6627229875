//! The write side of the attribution ledger.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{AttributionOutcome, AttributionRecord, ConflictPolicy, NewAttribution, TenantId},
    events::{AttributionRecordedEvent, EventProducers},
    tally_api::retry::RetryPolicy,
    traits::{AnalyticsError, AttributionManagement},
};

/// `AttributionApi` records per-order attribution rows and notifies the attribution recorded hooks.
pub struct AttributionApi<B> {
    db: B,
    producers: EventProducers,
    retry: RetryPolicy,
}

impl<B> Debug for AttributionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AttributionApi ({:?})", self.retry)
    }
}

impl<B> AttributionApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl<B> AttributionApi<B>
where B: AttributionManagement
{
    /// Writes the attribution for an order. If the order already has a row, `policy` decides the result:
    /// * [`ConflictPolicy::IgnoreIfExists`] leaves the existing row untouched,
    /// * [`ConflictPolicy::MergeNumeric`] adds revenue and cost, fills in campaign identifiers and merges metadata,
    /// * [`ConflictPolicy::Replace`] overwrites every value column.
    pub async fn record_attribution(
        &self,
        record: NewAttribution,
        policy: ConflictPolicy,
    ) -> Result<(AttributionRecord, AttributionOutcome), AnalyticsError> {
        validate_attribution(&record)?;
        let db = &self.db;
        let record = &record;
        let (stored, outcome) =
            self.retry.run("Attribution write", move || db.record_attribution(record.clone(), policy)).await?;
        debug!("🧾️ Order {} [{}] on {}: {outcome}", stored.order_id, stored.tenant_id, stored.channel);
        self.producers.publish_attribution_recorded(AttributionRecordedEvent::new(&stored, outcome));
        Ok((stored, outcome))
    }

    pub async fn fetch_attribution(
        &self,
        tenant: &TenantId,
        order_id: &str,
    ) -> Result<Option<AttributionRecord>, AnalyticsError> {
        self.db.fetch_attribution(tenant, order_id).await
    }
}

pub fn validate_attribution(record: &NewAttribution) -> Result<(), AnalyticsError> {
    if record.tenant_id.is_empty() {
        return Err(AnalyticsError::ValidationError("A tenant id is required".into()));
    }
    if record.order_id.trim().is_empty() {
        return Err(AnalyticsError::ValidationError("An order id is required".into()));
    }
    if record.channel.trim().is_empty() {
        return Err(AnalyticsError::ValidationError("A channel is required".into()));
    }
    if record.revenue.value() < 0 {
        return Err(AnalyticsError::ValidationError(format!("Revenue cannot be negative ({})", record.revenue)));
    }
    if record.cost.value() < 0 {
        return Err(AnalyticsError::ValidationError(format!("Cost cannot be negative ({})", record.cost)));
    }
    if !record.metadata.is_object() {
        return Err(AnalyticsError::ValidationError("Attribution metadata must be a JSON object".into()));
    }
    Ok(())
}
