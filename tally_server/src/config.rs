use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use tally_common::helpers::parse_boolean_flag;
use tally_engine::{
    broadcast::{BroadcastConfig, DEFAULT_BROADCAST_INTERVAL, DEFAULT_CONNECTION_BUFFER},
    summary_objects::TimeRange,
};

const DEFAULT_TALLY_HOST: &str = "127.0.0.1";
const DEFAULT_TALLY_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/tally_store.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_DB_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_EVENT_BUFFER: usize = 256;
const DEFAULT_MERGE_RETRIES: u32 = 5;
pub const DEFAULT_TENANT_HEADER: &str = "X-Tenant-Id";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    /// How long a write waits for the database lock before it fails as a transient error.
    pub db_busy_timeout: Duration,
    /// Periodic summary interval, default summary range and per-connection queue size for the live channel.
    pub broadcast: BroadcastConfig,
    /// The number of events each hook can have queued before new events are dropped.
    pub event_buffer: usize,
    /// The number of attempts a write gets when the store is busy.
    pub merge_retries: u32,
    /// The request header carrying the tenant id. It is set by the identity layer in front of this server.
    pub tenant_header: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TALLY_HOST.to_string(),
            port: DEFAULT_TALLY_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            db_busy_timeout: Duration::from_millis(DEFAULT_DB_BUSY_TIMEOUT_MS),
            broadcast: BroadcastConfig::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            merge_retries: DEFAULT_MERGE_RETRIES,
            tenant_header: DEFAULT_TENANT_HEADER.to_string(),
            use_x_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("TALLY_HOST").ok().unwrap_or_else(|| DEFAULT_TALLY_HOST.into());
        let port = parse_env("TALLY_PORT", DEFAULT_TALLY_PORT);
        let database_url = env::var("TALLY_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ TALLY_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_max_connections = parse_env("TALLY_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS).max(1);
        let db_busy_timeout = Duration::from_millis(parse_env("TALLY_DB_BUSY_TIMEOUT_MS", DEFAULT_DB_BUSY_TIMEOUT_MS));
        let broadcast = configure_broadcast();
        let event_buffer = parse_env("TALLY_EVENT_BUFFER", DEFAULT_EVENT_BUFFER).max(1);
        let merge_retries = parse_env("TALLY_MERGE_RETRIES", DEFAULT_MERGE_RETRIES).max(1);
        let tenant_header = env::var("TALLY_TENANT_HEADER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TENANT_HEADER.to_string());
        info!("🪛️ Tenants are identified by the {tenant_header} header");
        let use_x_forwarded_for = parse_boolean_flag(env::var("TALLY_USE_X_FORWARDED_FOR").ok(), false);
        Self {
            host,
            port,
            database_url,
            db_max_connections,
            db_busy_timeout,
            broadcast,
            event_buffer,
            merge_retries,
            tenant_header,
            use_x_forwarded_for,
        }
    }
}

fn configure_broadcast() -> BroadcastConfig {
    let interval_secs = parse_env("TALLY_BROADCAST_INTERVAL", DEFAULT_BROADCAST_INTERVAL.as_secs()).max(1);
    let default_range = match env::var("TALLY_DEFAULT_SUMMARY_RANGE") {
        Ok(s) => s.parse::<TimeRange>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for TALLY_DEFAULT_SUMMARY_RANGE. {e}. Using 24h instead.");
            TimeRange::Hours(24)
        }),
        Err(_) => TimeRange::Hours(24),
    };
    let connection_buffer = parse_env("TALLY_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER).max(1);
    info!(
        "🪛️ Live connections get a {default_range} summary every {interval_secs}s and queue up to \
         {connection_buffer} messages"
    );
    BroadcastConfig { interval: Duration::from_secs(interval_secs), default_range, connection_buffer }
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// The subset of the server configuration that request handlers need. Keep it small.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub tenant_header: String,
    pub use_x_forwarded_for: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { tenant_header: DEFAULT_TENANT_HEADER.to_string(), use_x_forwarded_for: false }
    }
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { tenant_header: config.tenant_header.clone(), use_x_forwarded_for: config.use_x_forwarded_for }
    }
}
