use std::sync::Arc;

use log::*;
use tally_engine::{broadcast::Broadcaster, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the periodic summary worker. The task ends once [`Broadcaster::shutdown`] has been called, so the returned
/// handle can be awaited during shutdown.
pub fn start_summary_worker(broadcaster: Arc<Broadcaster<SqliteDatabase>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("📡️ Summary worker started");
        broadcaster.run_periodic().await;
        info!("📡️ Summary worker stopped");
    })
}
