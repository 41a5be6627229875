use std::{
    pin::{pin, Pin},
    sync::Arc,
    time::Duration,
};

use actix_web::{
    body::MessageBody,
    http::{header, StatusCode},
    test,
    test::TestRequest,
    App,
};
use futures::future::poll_fn;
use serde_json::{json, Value};
use tally_engine::{
    db_types::{ChannelTotals, Counters, Money},
    events::{EventHandlers, EventHooks},
};

use super::{
    helpers::{broadcaster, with_tenant, Backends, TENANT},
    mocks::{stored_metric, MockStore},
};

/// Waits for the next chunk of a live stream. `None` means the stream has ended.
async fn next_frame<B>(mut body: Pin<&mut B>) -> Option<String>
where
    B: MessageBody,
    B::Error: std::fmt::Debug,
{
    let chunk = tokio::time::timeout(Duration::from_secs(2), poll_fn(|cx| body.as_mut().poll_next(cx)))
        .await
        .expect("Timed out waiting for a live event")?;
    Some(String::from_utf8_lossy(&chunk.unwrap()).into_owned())
}

/// The JSON payload of an SSE frame.
fn frame_data(frame: &str) -> Value {
    let data = frame.lines().find_map(|l| l.strip_prefix("data: ")).unwrap();
    serde_json::from_str(data).unwrap()
}

/// Calls the service and reads the response body as JSON, or `null` if it is not JSON.
macro_rules! call {
    ($app:expr, $req:expr) => {{
        let res = test::call_service(&$app, $req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))
    }};
}

fn post(tenant: &str, path: &str, body: Value) -> TestRequest {
    with_tenant(TestRequest::post().uri(path).set_json(body), tenant)
}

fn store_with_sales() -> MockStore {
    let mut store = MockStore::new();
    store
        .expect_fetch_counter_totals()
        .returning(|_, _, _| Ok(Counters::new().with("revenue", 150.0).with("orders", 2.0)));
    store.expect_fetch_channel_totals().returning(|_, _| {
        Ok(vec![ChannelTotals {
            channel: "facebook".into(),
            revenue: Money::from(7000),
            cost: Money::from(3500),
            orders: 1,
        }])
    });
    store
}

#[actix_web::test]
async fn subscribers_receive_their_metric_updates_and_requested_summaries() {
    let _ = env_logger::try_init().ok();
    let broadcaster = broadcaster(store_with_sales());
    let mut hooks = EventHooks::default();
    broadcaster.register_hooks(&mut hooks);
    let handlers = EventHandlers::new(8, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let mut metrics = MockStore::new();
    metrics.expect_merge_daily_metric().times(2).returning(|d| Ok(stored_metric(d)));
    let backends = Backends { metrics, producers, broadcaster: Arc::clone(&broadcaster), ..Default::default() };
    let app = test::init_service(App::new().configure(backends.configure())).await;

    // Open the stream
    let req = with_tenant(TestRequest::get().uri("/live"), TENANT).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    let mut body = pin!(res.into_body());
    let hello = next_frame(body.as_mut()).await.unwrap();
    assert!(hello.starts_with("event: connected\n"), "{hello}");
    let id = frame_data(&hello)["connectionId"].as_u64().unwrap();

    let (status, subs) = call!(app, post(TENANT, &format!("/live/{id}/subscribe"), json!(["revenue"])));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subs, json!({"connectionId": id, "subscriptions": ["revenue"]}));

    // An email merge is not pushed to a revenue subscriber. The revenue merge that follows is.
    let email = json!({"metric_type": "email", "date": "2024-03-01", "source": "klaviyo", "counters": {"sent": 10}});
    let (status, _) = call!(app, post(TENANT, "/ingest/metric", email));
    assert_eq!(status, StatusCode::OK);
    let revenue =
        json!({"metric_type": "revenue", "date": "2024-03-01", "source": "shopify", "counters": {"revenue": 100.0}});
    let (status, _) = call!(app, post(TENANT, "/ingest/metric", revenue));
    assert_eq!(status, StatusCode::OK);
    let update = next_frame(body.as_mut()).await.unwrap();
    assert!(update.starts_with("event: metric:update\n"), "{update}");
    let update = frame_data(&update);
    assert_eq!(update["metricType"], "revenue");
    assert_eq!(update["data"]["source"], "shopify");
    assert_eq!(update["data"]["counters"]["revenue"], 100.0);
    assert_eq!(update["data"]["mergeCount"], 0);

    let (status, reply) = call!(app, post(TENANT, &format!("/live/{id}/request"), json!({"timeRange": "7d"})));
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(reply["success"], true);
    let summary = next_frame(body.as_mut()).await.unwrap();
    assert!(summary.starts_with("event: analytics:update\n"), "{summary}");
    let summary = frame_data(&summary);
    assert_eq!(summary["summary"]["totalRevenue"], 150.0);
    assert_eq!(summary["summary"]["perChannel"][0]["roas"], 2.0);

    // Connections belong to the tenant that opened them
    let (status, _) = call!(app, post("shop-2", &format!("/live/{id}/subscribe"), json!("*")));
    assert_eq!(status, StatusCode::NOT_FOUND);
    let req = with_tenant(TestRequest::delete().uri(&format!("/live/{id}")), "shop-2");
    let (status, _) = call!(app, req);
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = with_tenant(TestRequest::delete().uri(&format!("/live/{id}")), TENANT);
    let (status, reply) = call!(app, req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"success": true, "message": format!("Connection {id} closed")}));
    assert!(next_frame(body.as_mut()).await.is_none());
    assert_eq!(broadcaster.registry().connection_count().await, 0);
}

#[actix_web::test]
async fn subscription_management() {
    let _ = env_logger::try_init().ok();
    let broadcaster = broadcaster(MockStore::new());
    let subscriber = broadcaster.registry().connect(TENANT.into()).await.unwrap();
    let id = subscriber.id().value();
    let backends = Backends { broadcaster: Arc::clone(&broadcaster), ..Default::default() };
    let app = test::init_service(App::new().configure(backends.configure())).await;

    let (status, subs) = call!(app, post(TENANT, &format!("/live/{id}/subscribe"), json!("*")));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subs["subscriptions"], json!(["*"]));
    let (status, subs) = call!(app, post(TENANT, &format!("/live/{id}/subscribe"), json!(["revenue", "email"])));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subs["subscriptions"], json!(["*", "email", "revenue"]));
    let (status, subs) = call!(app, post(TENANT, &format!("/live/{id}/unsubscribe"), json!(["*", "email"])));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subs["subscriptions"], json!(["revenue"]));

    let (status, body) = call!(app, post(TENANT, &format!("/live/{id}/subscribe"), json!("revenue")));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Expected a list of metric types"));
    let (status, _) = call!(app, post(TENANT, "/live/99/subscribe", json!(["revenue"])));
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call!(app, post(TENANT, "/live/first/subscribe", json!(["revenue"])));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Could not read request path"));
}

#[actix_web::test]
async fn shutdown_closes_streams_and_refuses_new_ones() {
    let _ = env_logger::try_init().ok();
    let broadcaster = broadcaster(MockStore::new());
    let backends = Backends { broadcaster: Arc::clone(&broadcaster), ..Default::default() };
    let app = test::init_service(App::new().configure(backends.configure())).await;

    let req = with_tenant(TestRequest::get().uri("/live"), TENANT).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let mut body = pin!(res.into_body());
    assert!(next_frame(body.as_mut()).await.is_some());

    broadcaster.shutdown().await;
    assert!(next_frame(body.as_mut()).await.is_none());
    let (status, _) = call!(app, with_tenant(TestRequest::get().uri("/live"), TENANT));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
