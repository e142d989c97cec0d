use std::sync::Arc;

use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::models::assignment::ShiftAssignment;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub clock: Arc<dyn Clock>,
    pub assignment_events_tx: broadcast::Sender<ShiftAssignment>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(clock: Arc<dyn Clock>, event_buffer_size: usize) -> Self {
        let (assignment_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store: Store::new(),
            clock,
            assignment_events_tx,
            metrics: Metrics::new(),
        }
    }
}
