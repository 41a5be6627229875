//! # Tally analytics public API
//!
//! The `tally_api` module exposes the programmatic API of the analytics engine. The API is modular, so that clients
//! can pick the parts they need:
//!
//! * [`metrics_api`] merges deltas into the per-day metric aggregates.
//! * [`attribution_api`] records per-order attribution rows under an explicit [`ConflictPolicy`].
//! * [`summary_api`] answers read-only summary and history queries.
//! * [`ingest_api`] folds normalized adapter records (storefront orders, ad insights, email metrics) into the two
//!   write primitives.
//!
//! The other submodules in this module are support types.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements the backend traits required by the API, plus the event producers for the APIs that write.
//!
//! ```rust,ignore
//! use tally_engine::{events::EventProducers, SqliteDatabase, SummaryApi, TimeRange};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = SummaryApi::new(db);
//! let summary = api.summarize_range(&tenant, TimeRange::Days(30)).await?;
//! ```
//!
//! [`ConflictPolicy`]: crate::db_types::ConflictPolicy

pub mod attribution_api;
pub mod errors;
pub mod ingest_api;
pub mod ingest_objects;
pub mod metrics_api;
pub mod retry;
pub mod summary_api;
pub mod summary_objects;
