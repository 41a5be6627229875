use actix_web::http::StatusCode;
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use tally_engine::{
    db_types::{ChannelTotals, Counters, MetricDelta, Money, TenantId},
    traits::AnalyticsError,
};

use super::{
    helpers::{get_request, Backends, TENANT},
    mocks::{stored_metric, MockStore},
};

fn store_with_sales(window_days: i64) -> MockStore {
    let mut store = MockStore::new();
    store
        .expect_fetch_counter_totals()
        .withf(move |t, m, w| t.as_str() == TENANT && m == "revenue" && w.end - w.start == Duration::days(window_days))
        .times(1)
        .returning(|_, _, _| Ok(Counters::new().with("revenue", 150.0).with("orders", 2.0)));
    store.expect_fetch_channel_totals().withf(|t, _| t.as_str() == TENANT).times(1).returning(|_, _| {
        Ok(vec![
            ChannelTotals {
                channel: "facebook".into(),
                revenue: Money::from(7000),
                cost: Money::from(3500),
                orders: 1,
            },
            ChannelTotals { channel: "organic".into(), revenue: Money::from(8000), cost: Money::from(0), orders: 1 },
        ])
    });
    store
}

#[actix_web::test]
async fn summary_over_a_range() {
    let _ = env_logger::try_init().ok();
    let backends = Backends { summaries: store_with_sales(7), ..Default::default() };
    let (status, body) = get_request(TENANT, "/analytics/summary?timeRange=7d", backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let summary: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(summary["tenantId"], TENANT);
    assert_eq!(summary["totalRevenue"], 150.0);
    assert_eq!(summary["totalOrders"], 2);
    assert_eq!(summary["averageOrderValue"], 75.0);
    let facebook = json!({"channel": "facebook", "revenue": 70.0, "cost": 35.0, "orders": 1, "roas": 2.0});
    assert_eq!(summary["perChannel"][0], facebook);
    assert_eq!(summary["perChannel"][1]["roas"], Value::Null);
}

#[actix_web::test]
async fn unparseable_ranges_fall_back_to_30_days() {
    let _ = env_logger::try_init().ok();
    let backends = Backends { summaries: store_with_sales(30), ..Default::default() };
    let (status, _) = get_request(TENANT, "/analytics/summary?timeRange=fortnight", backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let backends = Backends { summaries: store_with_sales(30), ..Default::default() };
    let (status, _) = get_request(TENANT, "/analytics/summary", backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn store_failures_are_server_errors() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_fetch_counter_totals()
        .returning(|_, _, _| Err(AnalyticsError::DatabaseError("pool timed out".into())));
    let backends = Backends { summaries: store, ..Default::default() };
    let (status, body) = get_request(TENANT, "/analytics/summary", backends.configure()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("pool timed out"), "{body}");
}

#[actix_web::test]
async fn metric_history() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    store
        .expect_fetch_daily_metrics()
        .withf(|t, m, w| t.as_str() == TENANT && m == "ad_spend" && w.end - w.start == Duration::hours(24))
        .times(1)
        .returning(|t, m, _| {
            let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
            let spend = |v| Counters::new().with("spend", v);
            Ok(vec![
                stored_metric(MetricDelta::new(t.clone(), m, day, "facebook", spend(29.5))),
                stored_metric(MetricDelta::new(t.clone(), m, day, "google", spend(12.0))),
            ])
        });
    let backends = Backends { summaries: store, ..Default::default() };
    let path = "/analytics/history?metricType=ad_spend&timeRange=24h";
    let (status, body) = get_request(TENANT, path, backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(rows.as_array().map(Vec::len), Some(2));
    assert_eq!(rows[0]["source"], "facebook");
    assert_eq!(rows[1]["counters"]["spend"], 12.0);
}

#[actix_web::test]
async fn metric_history_needs_a_metric_type() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request(TENANT, "/analytics/history", Backends::default().configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with(r#"{"error":"Could not read query parameters"#), "{body}");
}

#[actix_web::test]
async fn assistant_context() {
    let _ = env_logger::try_init().ok();
    let backends = Backends { summaries: store_with_sales(30), ..Default::default() };
    let (status, body) = get_request(TENANT, "/analytics/context?timeRange=30d", backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let context: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(context["timeRange"], "30 days");
    assert_eq!(context["totalRevenue"], "150.00");
    assert_eq!(context["totalOrders"], 2);
    assert_eq!(context["averageOrderValue"], "75.00");
    assert_eq!(context["channels"].as_array().map(Vec::len), Some(2));
}

#[actix_web::test]
async fn tenants_only_see_their_own_data() {
    let _ = env_logger::try_init().ok();
    let mut store = MockStore::new();
    let other = TenantId::from("shop-2");
    store
        .expect_fetch_counter_totals()
        .withf(move |t, _, _| t == &other)
        .times(1)
        .returning(|_, _, _| Ok(Counters::new()));
    store.expect_fetch_channel_totals().times(1).returning(|_, _| Ok(vec![]));
    let backends = Backends { summaries: store, ..Default::default() };
    let (status, body) = get_request("shop-2", "/analytics/summary", backends.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let summary: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(summary["tenantId"], "shop-2");
    assert_eq!(summary["totalRevenue"], 0.0);
    assert_eq!(summary["perChannel"], json!([]));
}
