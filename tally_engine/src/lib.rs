//! Tally Engine
//!
//! The Tally engine ingests commerce and advertising events for many tenants, keeps per-day metric aggregates and a
//! per-order attribution ledger, answers summary queries over them, and pushes live updates to connected clients.
//! It is transport-agnostic: the HTTP server lives in a separate crate.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend). Backends implement the traits in [`mod@traits`]. You should
//!    rarely need to touch the database directly. The exception is the data types stored in the database, which are
//!    defined in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@tally_api`]). [`MetricsApi`] and [`AttributionApi`] are the two write primitives,
//!    [`IngestApi`] folds adapter records into them, and [`SummaryApi`] answers read-only queries.
//! 3. The live push channel ([`mod@broadcast`]), which fans metric updates and periodic summaries out to clients.
//!
//! The engine also emits events (a metric was updated, an attribution was recorded) that can be hooked into. A simple
//! handler framework is used so that you can easily react to these events, which is how the push channel hears about
//! writes.
pub mod broadcast;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod tally_api;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use tally_api::{
    attribution_api::AttributionApi,
    errors::IngestError,
    ingest_api::{IngestApi, IngestedOrder},
    ingest_objects,
    metrics_api::MetricsApi,
    retry::RetryPolicy,
    summary_api::SummaryApi,
    summary_objects,
};
pub use traits::{AnalyticsDatabase, AnalyticsError, AttributionManagement, MetricManagement};
