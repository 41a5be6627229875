use crate::{
    db_types::{AttributionOutcome, AttributionRecord, ChannelTotals, ConflictPolicy, NewAttribution, TenantId},
    tally_api::summary_objects::TimeWindow,
    traits::AnalyticsError,
};

/// The `AttributionManagement` trait defines behaviour for the per-order attribution ledger.
///
/// The ledger never holds two rows for the same (tenant, order id).
#[allow(async_fn_in_trait)]
pub trait AttributionManagement {
    /// Writes an attribution row, resolving a collision with an existing row according to `policy`. Resolution must be
    /// atomic with respect to other writers of the same key.
    ///
    /// Returns the stored row after the write, and what the write did to it.
    async fn record_attribution(
        &self,
        record: NewAttribution,
        policy: ConflictPolicy,
    ) -> Result<(AttributionRecord, AttributionOutcome), AnalyticsError>;

    async fn fetch_attribution(
        &self,
        tenant: &TenantId,
        order_id: &str,
    ) -> Result<Option<AttributionRecord>, AnalyticsError>;

    /// Revenue, cost and order counts per channel for the orders placed inside the window, ordered by channel name.
    async fn fetch_channel_totals(
        &self,
        tenant: &TenantId,
        window: &TimeWindow,
    ) -> Result<Vec<ChannelTotals>, AnalyticsError>;
}
