//! # Storage backend contracts
//!
//! This module defines the behaviour a storage backend must expose to act as the store for the analytics engine.
//!
//! * [`MetricManagement`] owns the daily metric aggregates. Merges are additive: a merge only ever adds a delta to
//!   the counters of a (tenant, metric type, day, source) row and never replaces it.
//! * [`AttributionManagement`] owns the per-order attribution ledger, with a caller-selected
//!   [`ConflictPolicy`](crate::db_types::ConflictPolicy) for writes that hit an existing order.
//! * [`AnalyticsDatabase`] ties the two together and is what the public APIs are generic over.
//!
//! Backends must serialize conflicting writes per key (never globally), and report lock contention as
//! [`AnalyticsError::TransientStoreError`] rather than blocking indefinitely.
mod analytics_database;
mod attribution_management;
mod metric_management;

pub use analytics_database::{AnalyticsDatabase, AnalyticsError};
pub use attribution_management::AttributionManagement;
pub use metric_management::MetricManagement;
