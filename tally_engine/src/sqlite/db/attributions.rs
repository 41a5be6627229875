use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{AttributionOutcome, AttributionRecord, ChannelTotals, ConflictPolicy, NewAttribution, TenantId},
    tally_api::summary_objects::TimeWindow,
};

const INSERT_ATTRIBUTION: &str = r#"
    INSERT INTO attributions (
        tenant_id, order_id, channel, campaign_id, ad_set_id, ad_id, revenue, cost, attribution_model, order_date,
        metadata, created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
"#;

const ON_CONFLICT_IGNORE: &str = r#"
    ON CONFLICT (tenant_id, order_id) DO NOTHING
    RETURNING *
"#;

const ON_CONFLICT_MERGE: &str = r#"
    ON CONFLICT (tenant_id, order_id) DO UPDATE SET
        revenue = revenue + excluded.revenue,
        cost = cost + excluded.cost,
        campaign_id = COALESCE(excluded.campaign_id, campaign_id),
        ad_set_id = COALESCE(excluded.ad_set_id, ad_set_id),
        ad_id = COALESCE(excluded.ad_id, ad_id),
        metadata = json_patch(metadata, excluded.metadata),
        revision = revision + 1,
        updated_at = excluded.updated_at
    RETURNING *
"#;

const ON_CONFLICT_REPLACE: &str = r#"
    ON CONFLICT (tenant_id, order_id) DO UPDATE SET
        channel = excluded.channel,
        campaign_id = excluded.campaign_id,
        ad_set_id = excluded.ad_set_id,
        ad_id = excluded.ad_id,
        revenue = excluded.revenue,
        cost = excluded.cost,
        attribution_model = excluded.attribution_model,
        order_date = excluded.order_date,
        metadata = excluded.metadata,
        revision = revision + 1,
        updated_at = excluded.updated_at
    RETURNING *
"#;

/// Writes `record` into the ledger, resolving a (tenant, order id) collision with `policy` in the same statement.
///
/// For [`ConflictPolicy::IgnoreIfExists`] a collision returns no row from the insert, in which case the existing row is
/// read back on the same connection. Run this inside a transaction so that the read sees the row that blocked the
/// insert.
pub async fn record(
    record: &NewAttribution,
    policy: ConflictPolicy,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(AttributionRecord, AttributionOutcome), sqlx::Error> {
    let conflict_clause = match policy {
        ConflictPolicy::IgnoreIfExists => ON_CONFLICT_IGNORE,
        ConflictPolicy::MergeNumeric => ON_CONFLICT_MERGE,
        ConflictPolicy::Replace => ON_CONFLICT_REPLACE,
    };
    let sql = format!("{INSERT_ATTRIBUTION} {conflict_clause}");
    let written: Option<AttributionRecord> = sqlx::query_as(&sql)
        .bind(&record.tenant_id)
        .bind(&record.order_id)
        .bind(&record.channel)
        .bind(&record.campaign_id)
        .bind(&record.ad_set_id)
        .bind(&record.ad_id)
        .bind(record.revenue)
        .bind(record.cost)
        .bind(&record.attribution_model)
        .bind(record.order_date)
        .bind(Json(&record.metadata))
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;
    let result = match (written, policy) {
        (Some(row), _) if row.revision == 0 => (row, AttributionOutcome::Inserted),
        (Some(row), ConflictPolicy::MergeNumeric) => (row, AttributionOutcome::Merged),
        (Some(row), ConflictPolicy::Replace) => (row, AttributionOutcome::Replaced),
        (Some(row), ConflictPolicy::IgnoreIfExists) => (row, AttributionOutcome::Inserted),
        (None, _) => {
            let existing =
                fetch_attribution(&record.tenant_id, &record.order_id, conn).await?.ok_or(sqlx::Error::RowNotFound)?;
            (existing, AttributionOutcome::Ignored)
        },
    };
    trace!(
        "🗃️ Attribution for order {} [{}] was {} (revision {})",
        result.0.order_id,
        result.0.tenant_id,
        result.1,
        result.0.revision
    );
    Ok(result)
}

pub async fn fetch_attribution(
    tenant: &TenantId,
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AttributionRecord>, sqlx::Error> {
    let record = sqlx::query_as("SELECT * FROM attributions WHERE tenant_id = $1 AND order_id = $2")
        .bind(tenant)
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Groups the ledger rows whose order date falls inside the window by channel.
pub async fn channel_totals(
    tenant: &TenantId,
    window: &TimeWindow,
    conn: &mut SqliteConnection,
) -> Result<Vec<ChannelTotals>, sqlx::Error> {
    let totals = sqlx::query_as(
        r#"
        SELECT channel, SUM(revenue) AS revenue, SUM(cost) AS cost, COUNT(*) AS orders
        FROM attributions
        WHERE tenant_id = $1 AND order_date >= $2 AND order_date < $3
        GROUP BY channel
        ORDER BY channel
        "#,
    )
    .bind(tenant)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(conn)
    .await?;
    Ok(totals)
}
