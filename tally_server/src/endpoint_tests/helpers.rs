use std::sync::Arc;

use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use log::debug;
use serde_json::Value;
use tally_engine::{
    broadcast::{BroadcastConfig, Broadcaster},
    events::EventProducers,
    AttributionApi,
    IngestApi,
    MetricsApi,
    RetryPolicy,
    SummaryApi,
};

use super::mocks::MockStore;
use crate::{
    config::{ServerOptions, DEFAULT_TENANT_HEADER},
    server::configure_routes,
};

pub const TENANT: &str = "shop-1";

/// One mock per API, so that each test only sets expectations on the store calls it cares about. A mock without
/// expectations panics if it is called.
pub struct Backends {
    pub metrics: MockStore,
    pub attributions: MockStore,
    pub summaries: MockStore,
    pub broadcaster: Arc<Broadcaster<MockStore>>,
    pub producers: EventProducers,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            metrics: MockStore::new(),
            attributions: MockStore::new(),
            summaries: MockStore::new(),
            broadcaster: broadcaster(MockStore::new()),
            producers: EventProducers::default(),
        }
    }
}

impl Backends {
    pub fn configure(self) -> impl FnOnce(&mut ServiceConfig) {
        move |cfg| {
            let metrics = MetricsApi::new(self.metrics, self.producers.clone()).with_retry_policy(no_retries());
            let attributions = AttributionApi::new(self.attributions, self.producers).with_retry_policy(no_retries());
            cfg.app_data(web::Data::new(IngestApi::from_parts(metrics, attributions)))
                .app_data(web::Data::new(SummaryApi::new(self.summaries)))
                .app_data(web::Data::from(self.broadcaster))
                .app_data(web::Data::new(ServerOptions::default()));
            configure_routes::<MockStore>(cfg);
        }
    }
}

pub fn broadcaster(store: MockStore) -> Arc<Broadcaster<MockStore>> {
    Arc::new(Broadcaster::new(SummaryApi::new(store), BroadcastConfig::default()))
}

fn no_retries() -> RetryPolicy {
    RetryPolicy::no_retries()
}

pub fn with_tenant(req: TestRequest, tenant: &str) -> TestRequest {
    if tenant.is_empty() {
        req
    } else {
        req.insert_header((DEFAULT_TENANT_HEADER, tenant))
    }
}

pub async fn get_request<F>(tenant: &str, path: &str, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    send(with_tenant(TestRequest::get().uri(path), tenant), configure).await
}

pub async fn post_request<F>(tenant: &str, path: &str, body: Value, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    send(with_tenant(TestRequest::post().uri(path).set_json(body), tenant), configure).await
}

async fn send<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}
