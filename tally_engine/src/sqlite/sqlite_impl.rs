//! `SqliteDatabase` is a concrete implementation of an analytics storage backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! [`traits`]: crate::traits
use std::{fmt::Debug, time::Duration};

use chrono::{NaiveDate, Utc};
use log::*;
use sqlx::{migrate::Migrator, SqlitePool};

use super::db::{attributions, daily_metrics, db_url, new_pool, DEFAULT_BUSY_TIMEOUT};
use crate::{
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
    tally_api::summary_objects::TimeWindow,
    traits::{AnalyticsDatabase, AnalyticsError, AttributionManagement, MetricManagement},
};

static MIGRATOR: Migrator = sqlx::migrate!("./src/sqlite/migrations");

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl MetricManagement for SqliteDatabase {
    async fn merge_daily_metric(&self, delta: MetricDelta) -> Result<DailyMetric, AnalyticsError> {
        let mut tx = self.pool.begin().await?;
        let metric = daily_metrics::merge(&delta, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ {} metric for {} [{}] on {} now has {} merges",
            metric.metric_type, metric.source, metric.tenant_id, metric.metric_date, metric.merge_count
        );
        Ok(metric)
    }

    async fn fetch_daily_metric(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        date: NaiveDate,
        source: &str,
    ) -> Result<Option<DailyMetric>, AnalyticsError> {
        let mut conn = self.pool.acquire().await?;
        let metric = daily_metrics::fetch_metric(tenant, metric_type, date, source, &mut conn).await?;
        Ok(metric)
    }

    async fn fetch_daily_metrics(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        window: &TimeWindow,
    ) -> Result<Vec<DailyMetric>, AnalyticsError> {
        // Rows and counters are read in two statements, so share a snapshot between them.
        let mut tx = self.pool.begin().await?;
        let metrics = daily_metrics::fetch_metrics_in_window(tenant, metric_type, window, &mut tx).await?;
        tx.commit().await?;
        Ok(metrics)
    }

    async fn fetch_counter_totals(
        &self,
        tenant: &TenantId,
        metric_type: &str,
        window: &TimeWindow,
    ) -> Result<Counters, AnalyticsError> {
        let mut conn = self.pool.acquire().await?;
        let totals = daily_metrics::sum_counters_in_window(tenant, metric_type, window, &mut conn).await?;
        Ok(totals)
    }
}

impl AttributionManagement for SqliteDatabase {
    async fn record_attribution(
        &self,
        record: NewAttribution,
        policy: ConflictPolicy,
    ) -> Result<(AttributionRecord, AttributionOutcome), AnalyticsError> {
        let mut tx = self.pool.begin().await?;
        let result = attributions::record(&record, policy, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} [{}] recorded with policy {policy}: {}", record.order_id, record.tenant_id, result.1);
        Ok(result)
    }

    async fn fetch_attribution(
        &self,
        tenant: &TenantId,
        order_id: &str,
    ) -> Result<Option<AttributionRecord>, AnalyticsError> {
        let mut conn = self.pool.acquire().await?;
        let record = attributions::fetch_attribution(tenant, order_id, &mut conn).await?;
        Ok(record)
    }

    async fn fetch_channel_totals(
        &self,
        tenant: &TenantId,
        window: &TimeWindow,
    ) -> Result<Vec<ChannelTotals>, AnalyticsError> {
        let mut conn = self.pool.acquire().await?;
        let totals = attributions::channel_totals(tenant, window, &mut conn).await?;
        Ok(totals)
    }
}

impl AnalyticsDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), AnalyticsError> {
        self.pool.close().await;
        info!("🗃️ Database connection pool closed");
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        SqliteDatabase::new_with_options(url, max_connections, DEFAULT_BUSY_TIMEOUT).await
    }

    /// Creates a new database API object with an explicit lock wait. Writers that cannot get the write lock within
    /// `busy_timeout` fail with [`AnalyticsError::TransientStoreError`].
    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections, busy_timeout).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn migrate(&self) -> Result<(), AnalyticsError> {
        MIGRATOR.run(&self.pool).await.map_err(|e| AnalyticsError::DatabaseError(format!("Migration failed. {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
