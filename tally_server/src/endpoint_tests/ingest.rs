use actix_web::http::StatusCode;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tally_engine::{
    db_types::{AttributionOutcome, ConflictPolicy, DailyMetric, Money},
    ingest_objects::SyncReport,
    traits::AnalyticsError,
};

use super::{
    helpers::{post_request, Backends, TENANT},
    mocks::{stored_attribution, stored_metric},
};

fn march_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

#[actix_web::test]
async fn metric_deltas_are_bucketed_by_day() {
    let _ = env_logger::try_init().ok();
    let mut backends = Backends::default();
    backends
        .metrics
        .expect_merge_daily_metric()
        .withf(|d| {
            d.tenant_id.as_str() == TENANT &&
                d.metric_type == "revenue" &&
                d.date == march_first() &&
                d.source == "shopify" &&
                d.delta.get("revenue") == 100.0 &&
                d.delta.get("orders") == 1.0
        })
        .times(1)
        .returning(|d| Ok(stored_metric(d)));
    let body = json!({
        "metric_type": "revenue",
        "date": "2024-03-01T14:30:00Z",
        "source": "shopify",
        "counters": {"revenue": 100.0, "orders": 1},
    });
    let (status, body) = post_request(TENANT, "/ingest/metric", body, backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let metric: DailyMetric = serde_json::from_str(&body).unwrap();
    assert_eq!(metric.metric_date, march_first());
    assert_eq!(metric.counters.get("revenue"), 100.0);
}

#[actix_web::test]
async fn busy_store_is_reported_as_unavailable() {
    let _ = env_logger::try_init().ok();
    let mut backends = Backends::default();
    backends
        .metrics
        .expect_merge_daily_metric()
        .times(1)
        .returning(|_| Err(AnalyticsError::TransientStoreError("database is locked".into())));
    let body = json!({"metric_type": "email", "date": "2024-03-01", "source": "klaviyo", "counters": {"sent": 10}});
    let (status, body) = post_request(TENANT, "/ingest/metric", body, backends.configure()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("The store is busy"), "{body}");
}

#[actix_web::test]
async fn malformed_metric_requests() {
    let _ = env_logger::try_init().ok();
    // No metric type
    let body = json!({"date": "2024-03-01", "source": "shopify", "counters": {}});
    let (status, body) = post_request(TENANT, "/ingest/metric", body, Backends::default().configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with(r#"{"error":"Could not read request body"#), "{body}");
    // Bad date. The store is never touched
    let body = json!({"metric_type": "revenue", "date": "March 1st", "source": "shopify", "counters": {}});
    let (status, _) = post_request(TENANT, "/ingest/metric", body, Backends::default().configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn attribution_writes_carry_their_policy() {
    let _ = env_logger::try_init().ok();
    let mut backends = Backends::default();
    backends
        .attributions
        .expect_record_attribution()
        .withf(|r, p| {
            r.tenant_id.as_str() == TENANT &&
                r.order_id == "1001" &&
                r.channel == "facebook" &&
                r.cost == Money::from(3000) &&
                r.ad_id.as_deref() == Some("ad-7") &&
                *p == ConflictPolicy::MergeNumeric
        })
        .times(1)
        .returning(|r, _| Ok((stored_attribution(r, 1), AttributionOutcome::Merged)));
    let body = json!({
        "order_id": "1001",
        "channel": "facebook",
        "ad_id": "ad-7",
        "cost": 30.0,
        "order_date": "2024-03-01T14:30:00Z",
        "policy": "merge_numeric",
    });
    let (status, body) = post_request(TENANT, "/ingest/attribution", body, backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["outcome"], "merged");
    assert_eq!(body["record"]["cost"], 3000);
    assert_eq!(body["record"]["revision"], 1);
}

#[actix_web::test]
async fn negative_amounts_are_rejected() {
    let _ = env_logger::try_init().ok();
    let body = json!({
        "order_id": "1001",
        "channel": "organic",
        "revenue": -5.0,
        "order_date": "2024-03-01",
        "policy": "ignore_if_exists",
    });
    let (status, body) = post_request(TENANT, "/ingest/attribution", body, Backends::default().configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Revenue cannot be negative"), "{body}");
}

#[actix_web::test]
async fn storefront_batches_count_bad_orders() {
    let _ = env_logger::try_init().ok();
    let mut backends = Backends::default();
    backends
        .metrics
        .expect_merge_daily_metric()
        .withf(|d| d.metric_type == "revenue" && d.delta.get("revenue") == 42.5)
        .times(1)
        .returning(|d| Ok(stored_metric(d)));
    let body = json!([
        {"id": 5001, "total_price": "42.50", "created_at": "2024-03-01T09:00:00Z"},
        {"id": 5002, "total_price": "10.00", "created_at": "last tuesday"},
    ]);
    let (status, body) = post_request(TENANT, "/ingest/storefront_orders", body, backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let report: SyncReport = serde_json::from_str(&body).unwrap();
    assert_eq!(report, SyncReport { processed: 1, failed: 1 });
}

#[actix_web::test]
async fn email_metrics_land_in_the_email_aggregate() {
    let _ = env_logger::try_init().ok();
    let mut backends = Backends::default();
    backends
        .metrics
        .expect_merge_daily_metric()
        .withf(|d| d.metric_type == "email" && d.source == "klaviyo" && d.delta.get("opened") == 250.0)
        .times(1)
        .returning(|d| Ok(stored_metric(d)));
    let body = json!({"source": "klaviyo", "date": "2024-03-01", "counters": {"sent": 1000, "opened": 250}});
    let (status, body) = post_request(TENANT, "/ingest/email_metrics", body, backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let metric: DailyMetric = serde_json::from_str(&body).unwrap();
    assert_eq!(metric.source, "klaviyo");
    assert_eq!(metric.counters.get("sent"), 1000.0);
}
