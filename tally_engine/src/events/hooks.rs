use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{AttributionRecordedEvent, EventHandler, EventProducer, Handler, MetricUpdatedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub metric_updated_producer: Vec<EventProducer<MetricUpdatedEvent>>,
    pub attribution_recorded_producer: Vec<EventProducer<AttributionRecordedEvent>>,
}

impl EventProducers {
    pub fn publish_metric_updated(&self, event: MetricUpdatedEvent) {
        for emitter in &self.metric_updated_producer {
            trace!("📬️ Notifying metric updated hook subscribers");
            emitter.publish_event(event.clone());
        }
    }

    pub fn publish_attribution_recorded(&self, event: AttributionRecordedEvent) {
        for emitter in &self.attribution_recorded_producer {
            trace!("📬️ Notifying attribution recorded hook subscribers");
            emitter.publish_event(event.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metric_updated_producer.is_empty() && self.attribution_recorded_producer.is_empty()
    }
}

pub struct EventHandlers {
    pub on_metric_updated: Option<EventHandler<MetricUpdatedEvent>>,
    pub on_attribution_recorded: Option<EventHandler<AttributionRecordedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_metric_updated = hooks.on_metric_updated.map(|f| EventHandler::new(buffer_size, f));
        let on_attribution_recorded = hooks.on_attribution_recorded.map(|f| EventHandler::new(buffer_size, f));
        Self { on_metric_updated, on_attribution_recorded }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_metric_updated {
            result.metric_updated_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_attribution_recorded {
            result.attribution_recorded_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per registered hook. Each task ends once every producer obtained from [`Self::producers`] has
    /// been dropped and the queued events have been handled.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_metric_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_attribution_recorded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_metric_updated: Option<Handler<MetricUpdatedEvent>>,
    pub on_attribution_recorded: Option<Handler<AttributionRecordedEvent>>,
}

impl EventHooks {
    pub fn on_metric_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(MetricUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_metric_updated = Some(Arc::new(f));
        self
    }

    pub fn on_attribution_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AttributionRecordedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_attribution_recorded = Some(Arc::new(f));
        self
    }
}
