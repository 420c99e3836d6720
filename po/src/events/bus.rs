//! Bounded broadcast bus per run

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::RunEvent;

/// Default per-run channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Per-run pub/sub channel for orchestrator events
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget emit; no subscribers is fine
    pub fn emit(&self, event: RunEvent) {
        debug!(event_type = event.event_type(), run_id = event.run_id(), "emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe; only events emitted after subscription are received
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    /// Emitter handle bound to a run id
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
            run_id: run_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap-to-clone handle components emit through
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<RunEvent>,
    run_id: String,
}

impl EventEmitter {
    /// An emitter wired to nothing (unit tests of inner components)
    pub fn null() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            run_id: "null".to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    pub fn inference_started(&self, inference: &str, flow_index: &str, sequence: &str, cycle: u64) {
        self.emit(RunEvent::InferenceStarted {
            run_id: self.run_id.clone(),
            inference: inference.to_string(),
            flow_index: flow_index.to_string(),
            sequence: sequence.to_string(),
            cycle,
        });
    }

    pub fn inference_completed(&self, inference: &str, flow_index: &str, concept_written: Option<&str>, cycle: u64) {
        self.emit(RunEvent::InferenceCompleted {
            run_id: self.run_id.clone(),
            inference: inference.to_string(),
            flow_index: flow_index.to_string(),
            concept_written: concept_written.map(String::from),
            cycle,
        });
    }

    pub fn inference_failed(&self, inference: &str, flow_index: &str, error: &str, will_retry: bool, cycle: u64) {
        self.emit(RunEvent::InferenceFailed {
            run_id: self.run_id.clone(),
            inference: inference.to_string(),
            flow_index: flow_index.to_string(),
            error: error.to_string(),
            will_retry,
            cycle,
        });
    }

    pub fn cycle_completed(&self, cycle: u64, fired: usize) {
        self.emit(RunEvent::CycleCompleted {
            run_id: self.run_id.clone(),
            cycle,
            fired,
        });
    }

    pub fn run_completed(&self, cycles: u64) {
        self.emit(RunEvent::RunCompleted {
            run_id: self.run_id.clone(),
            cycles,
        });
    }

    pub fn run_failed(&self, kind: &str, detail: &str) {
        self.emit(RunEvent::RunFailed {
            run_id: self.run_id.clone(),
            kind: kind.to_string(),
            detail: detail.to_string(),
        });
    }

    pub fn run_paused(&self, cycle: u64) {
        self.emit(RunEvent::RunPaused {
            run_id: self.run_id.clone(),
            cycle,
        });
    }
}

/// Shared bus for host-level consumers
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-1");

        emitter.inference_started("i1", "1.2", "imperative", 0);
        emitter.inference_completed("i1", "1.2", Some("c1"), 0);
        emitter.run_completed(1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "InferenceStarted");
        assert_eq!(event.run_id(), "run-1");
        assert_eq!(rx.recv().await.unwrap().event_type(), "InferenceCompleted");
        assert_eq!(rx.recv().await.unwrap().event_type(), "RunCompleted");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        bus.emitter_for("run-1").cycle_completed(1, 3);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_bounded_lag() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-1");
        for i in 0..10 {
            emitter.cycle_completed(i, 0);
        }
        // Oldest events were dropped; receiver lags but continues
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n > 0),
            Ok(event) => assert_eq!(event.event_type(), "CycleCompleted"),
            Err(e) => panic!("unexpected: {e:?}"),
        }
    }
}
