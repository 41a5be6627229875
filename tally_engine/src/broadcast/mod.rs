//! # Live push channel
//!
//! Clients hold a long-lived connection and receive pushes for their tenant:
//! * `metric:update` whenever a metric type they subscribed to is merged,
//! * `analytics:update` with a fresh summary every broadcast interval, or when they ask for one.
//!
//! The [`SubscriptionRegistry`] tracks connections and their scopes. It holds no aggregate data. The [`Broadcaster`]
//! owns a registry and reads summaries through [`crate::SummaryApi`].
//!
//! Every connection has a bounded outbound queue. When a client falls behind, its oldest pending pushes are dropped
//! and the newest are kept. A slow client never blocks other clients or the writers.
mod broadcaster;
mod messages;
mod registry;

use thiserror::Error;

pub use broadcaster::{BroadcastConfig, Broadcaster, DEFAULT_BROADCAST_INTERVAL, DEFAULT_CONNECTION_BUFFER};
pub use messages::{MetricUpdateData, PushMessage};
pub use registry::{ConnectionId, ConnectionState, Scope, Subscriber, SubscriptionRegistry};

use crate::traits::AnalyticsError;

#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    #[error("Connection {0} does not exist")]
    UnknownConnection(ConnectionId),
    #[error("The broadcaster has shut down")]
    ShutDown,
    #[error(transparent)]
    Store(#[from] AnalyticsError),
}
