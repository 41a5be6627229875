//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every data-bearing handler takes a [`Tenant`]. A request without the tenant header is rejected before the handler
//! runs, so handlers never see data from more than one tenant.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use log::*;
use tally_engine::{
    broadcast::{Broadcaster, ConnectionId},
    ingest_objects::{AdInsight, EmailMetrics, StorefrontOrder},
    traits::{AttributionManagement, MetricManagement},
    IngestApi,
    SummaryApi,
};

use crate::{
    config::ServerOptions,
    data_objects::{
        AttributionRequest,
        AttributionResponse,
        HistoryParams,
        JsonResponse,
        MetricDeltaRequest,
        RangeParams,
        ScopeRequest,
        SubscriptionResponse,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    live_stream::{event_stream, EVENT_STREAM_CONTENT_TYPE},
    tenant::Tenant,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ident),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Ingest  ----------------------------------------------------
route!(ingest_metric => Post "/ingest/metric" impl MetricManagement, AttributionManagement);
/// Merges a raw counter delta into the tenant's daily aggregate and returns the row as it stands afterwards.
pub async fn ingest_metric<B>(
    tenant: Tenant,
    body: web::Json<MetricDeltaRequest>,
    api: web::Data<IngestApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let req = body.into_inner();
    trace!("💻️ Metric delta for {}: {}/{}/{}", tenant.id(), req.metric_type, req.date, req.source);
    let metric = api
        .metrics()
        .merge_daily_metric_at(tenant.into_inner(), &req.metric_type, &req.date, &req.source, req.counters)
        .await?;
    Ok(HttpResponse::Ok().json(metric))
}

route!(ingest_attribution => Post "/ingest/attribution" impl MetricManagement, AttributionManagement);
pub async fn ingest_attribution<B>(
    tenant: Tenant,
    body: web::Json<AttributionRequest>,
    api: web::Data<IngestApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let req = body.into_inner();
    let policy = req.policy;
    let record = req.into_new_attribution(tenant.into_inner())?;
    let (record, outcome) = api.attributions().record_attribution(record, policy).await?;
    Ok(HttpResponse::Ok().json(AttributionResponse { outcome, record }))
}

route!(ingest_storefront_orders => Post "/ingest/storefront_orders" impl MetricManagement, AttributionManagement);
/// Ingests a batch of storefront orders. Bad orders are counted in the report and do not fail the request.
pub async fn ingest_storefront_orders<B>(
    tenant: Tenant,
    body: web::Json<Vec<StorefrontOrder>>,
    api: web::Data<IngestApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    debug!("💻️ {} storefront orders received for {}", body.len(), tenant.id());
    let report = api.ingest_storefront_orders(tenant.id(), &body).await;
    Ok(HttpResponse::Ok().json(report))
}

route!(ingest_ad_insights => Post "/ingest/ad_insights" impl MetricManagement, AttributionManagement);
pub async fn ingest_ad_insights<B>(
    tenant: Tenant,
    body: web::Json<Vec<AdInsight>>,
    api: web::Data<IngestApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    debug!("💻️ {} ad insights received for {}", body.len(), tenant.id());
    let report = api.ingest_ad_insights(tenant.id(), &body).await;
    Ok(HttpResponse::Ok().json(report))
}

route!(ingest_email_metrics => Post "/ingest/email_metrics" impl MetricManagement, AttributionManagement);
pub async fn ingest_email_metrics<B>(
    tenant: Tenant,
    body: web::Json<EmailMetrics>,
    api: web::Data<IngestApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let metric = api.ingest_email_metrics(tenant.id(), &body).await?;
    Ok(HttpResponse::Ok().json(metric))
}

//----------------------------------------------   Analytics  ----------------------------------------------------
route!(summary => Get "/analytics/summary" impl MetricManagement, AttributionManagement);
pub async fn summary<B>(
    tenant: Tenant,
    query: web::Query<RangeParams>,
    api: web::Data<SummaryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let summary = api.summarize_range(tenant.id(), query.range()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(history => Get "/analytics/history" impl MetricManagement, AttributionManagement);
/// The stored daily rows of one metric type, oldest first.
pub async fn history<B>(
    tenant: Tenant,
    query: web::Query<HistoryParams>,
    api: web::Data<SummaryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let window = query.range().window_ending_now();
    let metrics = api.daily_metrics(tenant.id(), &query.metric_type, &window).await?;
    Ok(HttpResponse::Ok().json(metrics))
}

route!(assistant_context => Get "/analytics/context" impl MetricManagement, AttributionManagement);
pub async fn assistant_context<B>(
    tenant: Tenant,
    query: web::Query<RangeParams>,
    api: web::Data<SummaryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let context = api.assistant_context(tenant.id(), query.range()).await?;
    Ok(HttpResponse::Ok().json(context))
}

//----------------------------------------------   Live  ----------------------------------------------------
route!(live => Get "/live" impl MetricManagement, AttributionManagement);
/// Opens a Server-Sent Events stream for the tenant. The first event carries the connection id that the other `/live`
/// routes expect in their path.
pub async fn live<B>(
    req: HttpRequest,
    tenant: Tenant,
    options: web::Data<ServerOptions>,
    broadcaster: web::Data<Broadcaster<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let subscriber = broadcaster.registry().connect(tenant.into_inner()).await?;
    let peer = get_remote_ip(&req, options.use_x_forwarded_for)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "an unknown address".into());
    info!("💻️ Live connection {} opened from {peer}", subscriber.id());
    Ok(HttpResponse::Ok()
        .content_type(EVENT_STREAM_CONTENT_TYPE)
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(event_stream(subscriber)))
}

route!(subscribe => Post "/live/{connection_id}/subscribe" impl MetricManagement, AttributionManagement);
pub async fn subscribe<B>(
    tenant: Tenant,
    path: web::Path<u64>,
    body: web::Json<ScopeRequest>,
    broadcaster: web::Data<Broadcaster<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let id = ConnectionId::from(path.into_inner());
    let scopes = body.scopes()?;
    let state = broadcaster.registry().subscribe(tenant.id(), id, scopes).await?;
    Ok(HttpResponse::Ok().json(SubscriptionResponse::new(id, &state)))
}

route!(unsubscribe => Post "/live/{connection_id}/unsubscribe" impl MetricManagement, AttributionManagement);
pub async fn unsubscribe<B>(
    tenant: Tenant,
    path: web::Path<u64>,
    body: web::Json<ScopeRequest>,
    broadcaster: web::Data<Broadcaster<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let id = ConnectionId::from(path.into_inner());
    let scopes = body.scopes()?;
    let state = broadcaster.registry().unsubscribe(tenant.id(), id, scopes).await?;
    Ok(HttpResponse::Ok().json(SubscriptionResponse::new(id, &state)))
}

route!(request_summary => Post "/live/{connection_id}/request" impl MetricManagement, AttributionManagement);
/// Queues a summary of the requested range on the caller's live connection. The summary arrives as an
/// `analytics:update` event on the stream, not in this response.
pub async fn request_summary<B>(
    tenant: Tenant,
    path: web::Path<u64>,
    body: web::Json<RangeParams>,
    broadcaster: web::Data<Broadcaster<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let id = ConnectionId::from(path.into_inner());
    let range = body.range();
    broadcaster.send_summary_to(tenant.id(), id, range).await?;
    let msg = format!("Summary for the last {} queued", range.describe());
    Ok(HttpResponse::Accepted().json(JsonResponse::success(msg)))
}

route!(disconnect => Delete "/live/{connection_id}" impl MetricManagement, AttributionManagement);
pub async fn disconnect<B>(
    tenant: Tenant,
    path: web::Path<u64>,
    broadcaster: web::Data<Broadcaster<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: MetricManagement + AttributionManagement,
{
    let id = ConnectionId::from(path.into_inner());
    broadcaster.registry().disconnect(tenant.id(), id).await?;
    info!("💻️ Live connection {id} closed by the client");
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Connection {id} closed"))))
}
