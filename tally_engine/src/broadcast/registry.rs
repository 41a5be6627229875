use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{
    broadcast::{self, error::RecvError, error::TryRecvError},
    RwLock,
};

use crate::{
    broadcast::{BroadcastError, PushMessage},
    db_types::TenantId,
    events::MetricUpdatedEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a connection wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every metric type of the connection's tenant.
    AllMetrics,
    /// A single metric type.
    Metric(String),
}

impl Scope {
    pub fn metric<S: Into<String>>(metric_type: S) -> Self {
        Self::Metric(metric_type.into())
    }

    pub fn matches(&self, metric_type: &str) -> bool {
        match self {
            Scope::AllMetrics => true,
            Scope::Metric(m) => m == metric_type,
        }
    }
}

/// `Connected → Subscribed(scopes) → Disconnected`. Disconnected is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Subscribed(HashSet<Scope>),
    Disconnected,
}

struct Connection {
    tenant: TenantId,
    scopes: HashSet<Scope>,
    sender: broadcast::Sender<PushMessage>,
}

impl Connection {
    fn state(&self) -> ConnectionState {
        if self.scopes.is_empty() {
            ConnectionState::Connected
        } else {
            ConnectionState::Subscribed(self.scopes.clone())
        }
    }
}

/// The receiving half of a live connection.
///
/// If the client falls more than the queue size behind, the oldest messages are skipped and the receiver carries on
/// from the oldest message still queued.
pub struct Subscriber {
    id: ConnectionId,
    receiver: broadcast::Receiver<PushMessage>,
}

impl Subscriber {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Waits for the next message. Returns `None` once the connection has been disconnected.
    pub async fn recv(&mut self) -> Option<PushMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(n)) => debug!("📡️ Connection {} fell behind. {n} pushes dropped", self.id),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<PushMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(TryRecvError::Lagged(n)) => debug!("📡️ Connection {} fell behind. {n} pushes dropped", self.id),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Tracks live connections, their tenant and their subscription scopes.
///
/// The registry is cheap to clone, and clones share state. Fan-out works on a snapshot of the matching connections
/// taken under a short read lock; sends themselves never wait.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    buffer_size: usize,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriptionRegistry (buffer: {})", self.buffer_size)
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry. Each connection can queue up to `buffer_size` undelivered pushes.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers a new connection for `tenant`. The connection starts with no subscriptions, but always receives
    /// periodic summaries for its tenant.
    pub async fn connect(&self, tenant: TenantId) -> Result<Subscriber, BroadcastError> {
        // `shutdown` raises the flag before it takes the lock, so checking under the lock cannot miss a drain.
        let mut connections = self.connections.write().await;
        if self.is_shut_down() {
            return Err(BroadcastError::ShutDown);
        }
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = broadcast::channel(self.buffer_size);
        debug!("📡️ Connection {id} opened for {tenant}");
        connections.insert(id, Connection { tenant, scopes: HashSet::new(), sender });
        Ok(Subscriber { id, receiver })
    }

    /// Adds `scopes` to the connection's subscriptions. Subscribing twice to the same scope is a no-op.
    pub async fn subscribe<I>(
        &self,
        tenant: &TenantId,
        id: ConnectionId,
        scopes: I,
    ) -> Result<ConnectionState, BroadcastError>
    where
        I: IntoIterator<Item = Scope>,
    {
        let mut connections = self.connections.write().await;
        let conn = owned_connection(&mut connections, tenant, id)?;
        conn.scopes.extend(scopes);
        trace!("📡️ Connection {id} is subscribed to {:?}", conn.scopes);
        Ok(conn.state())
    }

    pub async fn unsubscribe<I>(
        &self,
        tenant: &TenantId,
        id: ConnectionId,
        scopes: I,
    ) -> Result<ConnectionState, BroadcastError>
    where
        I: IntoIterator<Item = Scope>,
    {
        let mut connections = self.connections.write().await;
        let conn = owned_connection(&mut connections, tenant, id)?;
        for scope in scopes {
            conn.scopes.remove(&scope);
        }
        Ok(conn.state())
    }

    /// Frees all state for the connection. The client's stream ends once it has drained its queue.
    pub async fn disconnect(&self, tenant: &TenantId, id: ConnectionId) -> Result<(), BroadcastError> {
        let mut connections = self.connections.write().await;
        owned_connection(&mut connections, tenant, id)?;
        connections.remove(&id);
        debug!("📡️ Connection {id} closed for {tenant}");
        Ok(())
    }

    pub async fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections.read().await.get(&id).map(Connection::state).unwrap_or(ConnectionState::Disconnected)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Tenants with at least one live connection, sorted.
    pub async fn active_tenants(&self) -> Vec<TenantId> {
        let connections = self.connections.read().await;
        let mut tenants = connections.values().map(|c| c.tenant.clone()).collect::<Vec<_>>();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    /// Queues `msg` for a single connection of `tenant`.
    pub async fn send_to(&self, tenant: &TenantId, id: ConnectionId, msg: PushMessage) -> Result<(), BroadcastError> {
        let sender = {
            let connections = self.connections.read().await;
            match connections.get(&id) {
                Some(c) if &c.tenant == tenant => c.sender.clone(),
                _ => return Err(BroadcastError::UnknownConnection(id)),
            }
        };
        if sender.send(msg).is_err() {
            self.prune(vec![id]).await;
            return Err(BroadcastError::UnknownConnection(id));
        }
        Ok(())
    }

    /// Queues `msg` for every connection of `tenant`, whatever their scopes. Returns the number of connections
    /// the message was queued for.
    pub async fn send_to_tenant(&self, tenant: &TenantId, msg: PushMessage) -> usize {
        let targets = self.snapshot(|c| &c.tenant == tenant).await;
        self.fan_out(targets, msg).await
    }

    /// Pushes a `metric:update` to every connection of the event's tenant subscribed to the metric type, or to all
    /// metrics. Returns the number of connections the message was queued for.
    pub async fn publish_metric_update(&self, event: &MetricUpdatedEvent) -> usize {
        let targets = self
            .snapshot(|c| c.tenant == event.tenant_id && c.scopes.iter().any(|s| s.matches(&event.metric_type)))
            .await;
        if targets.is_empty() {
            return 0;
        }
        let sent = self.fan_out(targets, PushMessage::from(event)).await;
        trace!("📡️ {} update for {} pushed to {sent} connections", event.metric_type, event.tenant_id);
        sent
    }

    /// Disconnects every connection and refuses new ones.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut connections = self.connections.write().await;
        let n = connections.len();
        connections.clear();
        info!("📡️ Subscription registry shut down. {n} connections closed");
    }

    async fn snapshot<F>(&self, filter: F) -> Vec<(ConnectionId, broadcast::Sender<PushMessage>)>
    where F: Fn(&Connection) -> bool {
        let connections = self.connections.read().await;
        connections.iter().filter(|(_, c)| filter(c)).map(|(id, c)| (*id, c.sender.clone())).collect()
    }

    async fn fan_out(&self, targets: Vec<(ConnectionId, broadcast::Sender<PushMessage>)>, msg: PushMessage) -> usize {
        let mut sent = 0;
        let mut dead = Vec::new();
        for (id, sender) in targets {
            match sender.send(msg.clone()) {
                Ok(_) => sent += 1,
                Err(_) => dead.push(id),
            }
        }
        if !dead.is_empty() {
            self.prune(dead).await;
        }
        sent
    }

    // A send fails only when the receiving half is gone, i.e. the client went away without saying goodbye.
    async fn prune(&self, ids: Vec<ConnectionId>) {
        let mut connections = self.connections.write().await;
        for id in ids {
            if connections.remove(&id).is_some() {
                debug!("📡️ Connection {id} is gone. Removed from the registry");
            }
        }
    }
}

fn owned_connection<'a>(
    connections: &'a mut HashMap<ConnectionId, Connection>,
    tenant: &TenantId,
    id: ConnectionId,
) -> Result<&'a mut Connection, BroadcastError> {
    match connections.get_mut(&id) {
        Some(conn) if &conn.tenant == tenant => Ok(conn),
        _ => Err(BroadcastError::UnknownConnection(id)),
    }
}
