use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use log::trace;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{Counters, DailyMetric, MetricDelta, TenantId},
    tally_api::summary_objects::TimeWindow,
};

/// The `daily_metrics` row without its counters.
#[derive(Debug, Clone, FromRow)]
struct MetricRow {
    id: i64,
    tenant_id: TenantId,
    metric_type: String,
    metric_date: NaiveDate,
    source: String,
    merge_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MetricRow {
    fn with_counters(self, counters: Counters) -> DailyMetric {
        DailyMetric {
            id: self.id,
            tenant_id: self.tenant_id,
            metric_type: self.metric_type,
            metric_date: self.metric_date,
            source: self.source,
            counters,
            merge_count: self.merge_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Adds the delta onto the row for the delta's key, creating the row if necessary.
///
/// Both the row upsert and every counter increment are single `INSERT .. ON CONFLICT DO UPDATE` statements, so the
/// arithmetic happens inside SQLite under the write lock. Call this inside a transaction so that the row and its
/// counters change together.
pub async fn merge(
    delta: &MetricDelta,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DailyMetric, sqlx::Error> {
    let row: MetricRow = sqlx::query_as(
        r#"
        INSERT INTO daily_metrics (tenant_id, metric_type, metric_date, source, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (tenant_id, metric_type, metric_date, source) DO UPDATE SET
            merge_count = merge_count + 1,
            updated_at = excluded.updated_at
        RETURNING id, tenant_id, metric_type, metric_date, source, merge_count, created_at, updated_at
        "#,
    )
    .bind(&delta.tenant_id)
    .bind(&delta.metric_type)
    .bind(delta.date)
    .bind(&delta.source)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    for (name, value) in delta.delta.iter() {
        sqlx::query(
            r#"
            INSERT INTO daily_metric_counters (metric_id, name, value) VALUES ($1, $2, $3)
            ON CONFLICT (metric_id, name) DO UPDATE SET value = value + excluded.value
            "#,
        )
        .bind(row.id)
        .bind(name)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    }
    let counters = fetch_counters(row.id, conn).await?;
    trace!("🗃️ Merged {} counters into daily metric #{}", delta.delta.len(), row.id);
    Ok(row.with_counters(counters))
}

pub async fn fetch_counters(metric_id: i64, conn: &mut SqliteConnection) -> Result<Counters, sqlx::Error> {
    let counters: Vec<(String, f64)> =
        sqlx::query_as("SELECT name, value FROM daily_metric_counters WHERE metric_id = $1 ORDER BY name")
            .bind(metric_id)
            .fetch_all(conn)
            .await?;
    Ok(counters.into_iter().collect())
}

pub async fn fetch_metric(
    tenant: &TenantId,
    metric_type: &str,
    date: NaiveDate,
    source: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<DailyMetric>, sqlx::Error> {
    let row: Option<MetricRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, metric_type, metric_date, source, merge_count, created_at, updated_at
        FROM daily_metrics
        WHERE tenant_id = $1 AND metric_type = $2 AND metric_date = $3 AND source = $4
        "#,
    )
    .bind(tenant)
    .bind(metric_type)
    .bind(date)
    .bind(source)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            let counters = fetch_counters(row.id, conn).await?;
            Ok(Some(row.with_counters(counters)))
        },
        None => Ok(None),
    }
}

/// Fetches every row of `metric_type` whose day falls in the window, ordered by day and then source.
pub async fn fetch_metrics_in_window(
    tenant: &TenantId,
    metric_type: &str,
    window: &TimeWindow,
    conn: &mut SqliteConnection,
) -> Result<Vec<DailyMetric>, sqlx::Error> {
    let (first, last) = window.day_range();
    let rows: Vec<MetricRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, metric_type, metric_date, source, merge_count, created_at, updated_at
        FROM daily_metrics
        WHERE tenant_id = $1 AND metric_type = $2 AND metric_date >= $3 AND metric_date < $4
        ORDER BY metric_date, source
        "#,
    )
    .bind(tenant)
    .bind(metric_type)
    .bind(first)
    .bind(last)
    .fetch_all(&mut *conn)
    .await?;
    let counter_rows: Vec<(i64, String, f64)> = sqlx::query_as(
        r#"
        SELECT c.metric_id, c.name, c.value
        FROM daily_metric_counters c JOIN daily_metrics m ON m.id = c.metric_id
        WHERE m.tenant_id = $1 AND m.metric_type = $2 AND m.metric_date >= $3 AND m.metric_date < $4
        "#,
    )
    .bind(tenant)
    .bind(metric_type)
    .bind(first)
    .bind(last)
    .fetch_all(conn)
    .await?;
    let mut counters = HashMap::<i64, Counters>::new();
    for (metric_id, name, value) in counter_rows {
        counters.entry(metric_id).or_default().set(name, value);
    }
    let metrics = rows
        .into_iter()
        .map(|row| {
            let c = counters.remove(&row.id).unwrap_or_default();
            row.with_counters(c)
        })
        .collect();
    Ok(metrics)
}

/// Sums each counter of `metric_type` over all sources and over the days that fall in the window.
pub async fn sum_counters_in_window(
    tenant: &TenantId,
    metric_type: &str,
    window: &TimeWindow,
    conn: &mut SqliteConnection,
) -> Result<Counters, sqlx::Error> {
    let (first, last) = window.day_range();
    let totals: Vec<(String, f64)> = sqlx::query_as(
        r#"
        SELECT c.name, TOTAL(c.value) AS value
        FROM daily_metric_counters c JOIN daily_metrics m ON m.id = c.metric_id
        WHERE m.tenant_id = $1 AND m.metric_type = $2 AND m.metric_date >= $3 AND m.metric_date < $4
        GROUP BY c.name
        ORDER BY c.name
        "#,
    )
    .bind(tenant)
    .bind(metric_type)
    .bind(first)
    .bind(last)
    .fetch_all(conn)
    .await?;
    Ok(totals.into_iter().collect())
}
