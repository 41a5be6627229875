use std::{future::Future, pin::Pin, time::Duration};

use log::*;
use tokio::{sync::watch, time::Instant};

use crate::{
    broadcast::{BroadcastError, ConnectionId, PushMessage, SubscriptionRegistry},
    db_types::TenantId,
    events::{EventHooks, MetricUpdatedEvent},
    tally_api::{summary_api::SummaryApi, summary_objects::TimeRange},
    traits::{AttributionManagement, MetricManagement},
};

pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECTION_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// How often every tenant with a live connection receives a fresh summary.
    pub interval: Duration,
    /// The range summarised by the periodic push.
    pub default_range: TimeRange,
    /// The number of undelivered pushes each connection can hold before the oldest is dropped.
    pub connection_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_BROADCAST_INTERVAL,
            default_range: TimeRange::Hours(24),
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

/// Pushes summaries to live connections, periodically and on request.
///
/// A broadcaster is created at start-up and lives until [`Broadcaster::shutdown`] is called, which disconnects every
/// client and stops [`Broadcaster::run_periodic`].
pub struct Broadcaster<B> {
    registry: SubscriptionRegistry,
    summaries: SummaryApi<B>,
    config: BroadcastConfig,
    shutdown: watch::Sender<bool>,
}

impl<B> std::fmt::Debug for Broadcaster<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Broadcaster ({:?}, {:?})", self.registry, self.config)
    }
}

impl<B> Broadcaster<B> {
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Routes metric updated events to the registry so that subscribed connections hear about every merge.
    pub fn register_hooks(&self, hooks: &mut EventHooks) {
        let registry = self.registry.clone();
        hooks.on_metric_updated(move |event: MetricUpdatedEvent| {
            let registry = registry.clone();
            Box::pin(async move {
                registry.publish_metric_update(&event).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Disconnects every client and stops the periodic task.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.registry.shutdown().await;
        info!("📡️ Broadcaster has shut down");
    }
}

impl<B> Broadcaster<B>
where B: MetricManagement + AttributionManagement
{
    pub fn new(summaries: SummaryApi<B>, config: BroadcastConfig) -> Self {
        let registry = SubscriptionRegistry::new(config.connection_buffer);
        let (shutdown, _) = watch::channel(false);
        Self { registry, summaries, config, shutdown }
    }

    /// Sends the default-range summary to every connection of every tenant that has at least one. A tenant whose
    /// summary cannot be computed is skipped. Returns the number of tenants that received a summary.
    pub async fn broadcast_summaries(&self) -> usize {
        let tenants = self.registry.active_tenants().await;
        let mut pushed = 0;
        for tenant in tenants {
            match self.summaries.summarize_range(&tenant, self.config.default_range).await {
                Ok(summary) => {
                    let n = self.registry.send_to_tenant(&tenant, PushMessage::from(summary)).await;
                    trace!("📡️ Summary for {tenant} pushed to {n} connections");
                    pushed += 1;
                },
                Err(e) => warn!("📡️ Could not summarise {tenant} for the periodic broadcast. {e}"),
            }
        }
        pushed
    }

    /// Answers a client's request for the summary of `range`, on that client's connection only.
    pub async fn send_summary_to(
        &self,
        tenant: &TenantId,
        id: ConnectionId,
        range: TimeRange,
    ) -> Result<(), BroadcastError> {
        if self.is_shut_down() {
            return Err(BroadcastError::ShutDown);
        }
        let msg = match self.summaries.summarize_range(tenant, range).await {
            Ok(summary) => PushMessage::from(summary),
            Err(e) => {
                warn!("📡️ Could not summarise {tenant} over {range} for connection {id}. {e}");
                PushMessage::error(format!("Could not load analytics for {}", range.describe()))
            },
        };
        self.registry.send_to(tenant, id, msg).await
    }

    /// Broadcasts summaries every `interval` until [`Self::shutdown`] is called.
    pub async fn run_periodic(&self) {
        let mut stop = self.shutdown.subscribe();
        if *stop.borrow() {
            return;
        }
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("📡️ Broadcasting summaries every {period:?}");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let n = self.broadcast_summaries().await;
                    debug!("📡️ Periodic summaries pushed to {n} tenants");
                },
                _ = stop.changed() => {
                    info!("📡️ Periodic broadcast stopped");
                    break;
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use mockall::mock;

    use super::*;
    use crate::{
        broadcast::Scope,
        db_types::{
            AttributionOutcome,
            AttributionRecord,
            ChannelTotals,
            ConflictPolicy,
            Counters,
            DailyMetric,
            MetricDelta,
            Money,
            NewAttribution,
        },
        tally_api::summary_objects::TimeWindow,
        traits::AnalyticsError,
    };

    mock! {
        pub Store {}
        impl MetricManagement for Store {
            async fn merge_daily_metric(&self, delta: MetricDelta) -> Result<DailyMetric, AnalyticsError>;
            async fn fetch_daily_metric(&self, tenant: &TenantId, metric_type: &str, date: NaiveDate, source: &str) -> Result<Option<DailyMetric>, AnalyticsError>;
            async fn fetch_daily_metrics(&self, tenant: &TenantId, metric_type: &str, window: &TimeWindow) -> Result<Vec<DailyMetric>, AnalyticsError>;
            async fn fetch_counter_totals(&self, tenant: &TenantId, metric_type: &str, window: &TimeWindow) -> Result<Counters, AnalyticsError>;
        }
        impl AttributionManagement for Store {
            async fn record_attribution(&self, record: NewAttribution, policy: ConflictPolicy) -> Result<(AttributionRecord, AttributionOutcome), AnalyticsError>;
            async fn fetch_attribution(&self, tenant: &TenantId, order_id: &str) -> Result<Option<AttributionRecord>, AnalyticsError>;
            async fn fetch_channel_totals(&self, tenant: &TenantId, window: &TimeWindow) -> Result<Vec<ChannelTotals>, AnalyticsError>;
        }
    }

    fn store_with_revenue() -> MockStore {
        let mut store = MockStore::new();
        store
            .expect_fetch_counter_totals()
            .withf(|t, m, _| t.as_str() == "t1" && m == "revenue")
            .returning(|_, _, _| Ok(Counters::new().with("revenue", 250.0).with("orders", 2.0)));
        store.expect_fetch_channel_totals().withf(|t, _| t.as_str() == "t1").returning(|_, _| {
            Ok(vec![ChannelTotals {
                channel: "facebook".into(),
                revenue: Money::from(25000),
                cost: Money::from(5000),
                orders: 2,
            }])
        });
        store
            .expect_fetch_counter_totals()
            .withf(|t, _, _| t.as_str() != "t1")
            .returning(|_, _, _| Err(AnalyticsError::DatabaseError("offline".into())));
        store.expect_fetch_channel_totals().withf(|t, _| t.as_str() != "t1").returning(|_, _| Ok(vec![]));
        store
    }

    fn broadcaster(store: MockStore) -> Broadcaster<MockStore> {
        let config = BroadcastConfig { interval: Duration::from_millis(20), ..Default::default() };
        Broadcaster::new(SummaryApi::new(store), config)
    }

    #[tokio::test]
    async fn periodic_summaries_reach_every_connection_of_the_tenant() {
        let b = broadcaster(store_with_revenue());
        let t1 = TenantId::from("t1");
        let mut first = b.registry().connect(t1.clone()).await.unwrap();
        let mut second = b.registry().connect(t1.clone()).await.unwrap();
        b.registry().subscribe(&t1, second.id(), [Scope::metric("ad_spend")]).await.unwrap();
        let mut failing = b.registry().connect(TenantId::from("t2")).await.unwrap();

        assert_eq!(b.broadcast_summaries().await, 1);
        for sub in [&mut first, &mut second] {
            match sub.try_recv() {
                Some(PushMessage::AnalyticsUpdate { summary }) => {
                    assert_eq!(summary.total_revenue, 250.0);
                    assert_eq!(summary.total_orders, 2);
                    assert_eq!(summary.average_order_value, 125.0);
                    assert_eq!(summary.per_channel[0].roas.ratio(), Some(5.0));
                },
                other => panic!("Expected a summary, got {other:?}"),
            }
        }
        assert!(failing.try_recv().is_none());
    }

    #[tokio::test]
    async fn on_demand_summaries_go_to_the_requester_only() {
        let b = broadcaster(store_with_revenue());
        let t1 = TenantId::from("t1");
        let mut asker = b.registry().connect(t1.clone()).await.unwrap();
        let mut bystander = b.registry().connect(t1.clone()).await.unwrap();
        b.send_summary_to(&t1, asker.id(), TimeRange::Days(7)).await.unwrap();
        assert!(matches!(asker.try_recv(), Some(PushMessage::AnalyticsUpdate { .. })));
        assert!(bystander.try_recv().is_none());
        let err = b.send_summary_to(&t1, ConnectionId::from(999), TimeRange::Days(7)).await;
        assert!(matches!(err, Err(BroadcastError::UnknownConnection(_))));
    }

    #[tokio::test]
    async fn hooks_forward_metric_updates() {
        let b = broadcaster(MockStore::new());
        let mut hooks = EventHooks::default();
        b.register_hooks(&mut hooks);
        let handler = hooks.on_metric_updated.clone().unwrap();
        let t1 = TenantId::from("t1");
        let mut sub = b.registry().connect(t1.clone()).await.unwrap();
        b.registry().subscribe(&t1, sub.id(), [Scope::metric("revenue")]).await.unwrap();
        let event = MetricUpdatedEvent {
            tenant_id: t1,
            metric_type: "revenue".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            source: "shopify".into(),
            counters: Counters::new().with("revenue", 150.0).with("orders", 2.0),
            merge_count: 1,
            timestamp: chrono::Utc::now(),
        };
        (handler)(event).await;
        match sub.try_recv() {
            Some(PushMessage::MetricUpdate { metric_type, data, .. }) => {
                assert_eq!(metric_type, "revenue");
                assert_eq!(data.counters.get("orders"), 2.0);
            },
            other => panic!("Expected a metric update, got {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_the_periodic_task() {
        let b = broadcaster(store_with_revenue());
        let mut sub = b.registry().connect(TenantId::from("t1")).await.unwrap();
        let driver = async {
            assert!(matches!(sub.recv().await, Some(PushMessage::AnalyticsUpdate { .. })));
            b.shutdown().await;
        };
        let both = async { tokio::join!(b.run_periodic(), driver) };
        tokio::time::timeout(Duration::from_secs(2), both).await.expect("periodic task did not stop");
        assert!(b.is_shut_down());
        assert!(b.registry().connect(TenantId::from("t1")).await.is_err());
    }
}
