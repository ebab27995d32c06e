//! Notification fan-out for pipeline events

use common::PipelineEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Broadcasts [`PipelineEvent`]s to any number of subscribers.
///
/// Emitting never blocks and never fails: with no subscribers the event is
/// only logged.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        log::debug!("Event: {} {:?}", event.name(), event);
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Collect every event currently queued on `rx` without waiting
pub fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                log::warn!("Event subscriber lagged, {} events skipped", skipped);
            }
            Err(_) => break,
        }
    }
    events
}
