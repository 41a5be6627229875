//! # Tally server
//! This crate hosts the HTTP transport for the Tally engine. It is responsible for:
//! * Accepting normalized records from the platform adapters and folding them into the daily metric aggregates and
//!   the attribution ledger.
//! * Answering summary, history and assistant context queries.
//! * Holding the live Server-Sent Events connections that dashboards subscribe through.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/ingest/*`: Raw metric deltas, attribution writes, storefront orders, ad insights and email metrics.
//! * `/analytics/*`: Summaries, metric history and assistant context for a time range.
//! * `/live`: The push channel, and `/live/{connection_id}/*` to manage its subscriptions.
//!
//! Every route except `/health` requires the tenant header.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod live_stream;
pub mod routes;
pub mod server;
pub mod summary_worker;
pub mod tenant;
