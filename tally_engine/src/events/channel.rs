//! Simple stateless pub-sub event handler
//!
//! Components of the engine publish events (a metric was updated, an attribution was recorded) and any number of
//! hooks can react to them. Handlers are stateless: all they receive is the event itself. Handlers can be async, and
//! each event is handled on its own task.
//!
//! Publishing never waits. Writers must not be slowed down by a slow subscriber, so when a handler's queue is full the
//! event is dropped and a warning is logged.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc::{self, error::TrySendError};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight jobs before returning.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop the internal sender so that the loop ends when the last producer goes away.
        drop(self.sender);
        // Every job holds a clone of `done`. Once all clones are gone, `all_done.recv()` yields `None`.
        let (done, mut all_done) = mpsc::channel::<()>(1);
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            let job_guard = done.clone();
            tokio::spawn(async move {
                (handler)(ev).await;
                drop(job_guard);
                trace!("📬️ Event handled");
            });
        }
        drop(done);
        debug!("📬️ Waiting for outstanding jobs to complete");
        let _ = all_done.recv().await;
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub fn publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => warn!("📬️ Event queue is full. The event has been dropped."),
            Err(TrySendError::Closed(_)) => error!("📬️ Failed to send event: the handler has shut down"),
        }
    }
}
