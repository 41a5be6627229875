use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use tally_engine::{
    broadcast::Broadcaster,
    events::{EventHandlers, EventHooks, EventProducers},
    traits::{AttributionManagement, MetricManagement},
    IngestApi,
    RetryPolicy,
    SqliteDatabase,
    SummaryApi,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    routes::{
        health,
        AssistantContextRoute,
        DisconnectRoute,
        HistoryRoute,
        IngestAdInsightsRoute,
        IngestAttributionRoute,
        IngestEmailMetricsRoute,
        IngestMetricRoute,
        IngestStorefrontOrdersRoute,
        LiveRoute,
        RequestSummaryRoute,
        SubscribeRoute,
        SummaryRoute,
        UnsubscribeRoute,
    },
    summary_worker::start_summary_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_options(&config.database_url, config.db_max_connections, config.db_busy_timeout)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let broadcaster = Arc::new(Broadcaster::new(SummaryApi::new(db.clone()), config.broadcast));
    let mut hooks = EventHooks::default();
    broadcaster.register_hooks(&mut hooks);
    let handlers = EventHandlers::new(config.event_buffer, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let worker = start_summary_worker(Arc::clone(&broadcaster));

    let srv = create_server_instance(config, db, producers, Arc::clone(&broadcaster))?;
    // Live streams never end on their own, so the broadcaster has to close them before the server can stop gracefully.
    let handle = srv.handle();
    let on_signal = Arc::clone(&broadcaster);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("🚀️ Could not listen for the shutdown signal. {e}");
            return;
        }
        info!("🚀️ Shutdown signal received");
        on_signal.shutdown().await;
        handle.stop(true).await;
    });

    let result = srv.await.map_err(ServerError::from);
    if !broadcaster.is_shut_down() {
        broadcaster.shutdown().await;
    }
    if let Err(e) = worker.await {
        warn!("🚀️ Summary worker did not stop cleanly. {e}");
    }
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    broadcaster: Arc<Broadcaster<SqliteDatabase>>,
) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let retry = RetryPolicy { max_attempts: config.merge_retries, ..Default::default() };
    let srv = HttpServer::new(move || {
        let ingest_api = IngestApi::new(db.clone(), producers.clone()).with_retry_policy(retry);
        let summary_api = SummaryApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("tally::access_log"))
            .app_data(web::Data::new(ingest_api))
            .app_data(web::Data::new(summary_api))
            .app_data(web::Data::from(Arc::clone(&broadcaster)))
            .app_data(web::Data::new(options.clone()))
            .configure(configure_routes::<SqliteDatabase>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .disable_signals()
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route against the `B` backend, along with extractor configs that report malformed input as
/// [`ServerError`]s. The APIs and options themselves are expected in the app data.
pub fn configure_routes<B>(cfg: &mut web::ServiceConfig)
where B: MetricManagement + AttributionManagement + 'static {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .service(health)
        .service(IngestMetricRoute::<B>::new())
        .service(IngestAttributionRoute::<B>::new())
        .service(IngestStorefrontOrdersRoute::<B>::new())
        .service(IngestAdInsightsRoute::<B>::new())
        .service(IngestEmailMetricsRoute::<B>::new())
        .service(SummaryRoute::<B>::new())
        .service(HistoryRoute::<B>::new())
        .service(AssistantContextRoute::<B>::new())
        .service(LiveRoute::<B>::new())
        .service(SubscribeRoute::<B>::new())
        .service(UnsubscribeRoute::<B>::new())
        .service(RequestSummaryRoute::<B>::new())
        .service(DisconnectRoute::<B>::new());
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|e, _| ServerError::InvalidRequestBody(e.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|e, _| ServerError::InvalidQuery(e.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|e, _| ServerError::InvalidRequestPath(e.to_string()).into())
}
