//! Run event stream for observability.
//!
//! Emits [`RunEvent`]s via a [`tokio::sync::broadcast`] channel so observers
//! (progress printers, logs, UIs) can follow a validation run without
//! coupling to the pool internals. Subscribers are optional and may lag; the
//! pool never blocks on them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use casegrid_types::{Case, CaseStatus};

/// Events emitted during a validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        workers: usize,
    },
    CaseFinished {
        case: Case,
        status: CaseStatus,
        /// Number of cases finished so far, this one included.
        finished: usize,
    },
    RunCompleted {
        passed: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        emitter.emit(RunEvent::RunStarted { workers: 4 });
        match rx.recv().await.unwrap() {
            RunEvent::RunStarted { workers } => assert_eq!(workers, 4),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let emitter = EventEmitter::default();
        emitter.emit(RunEvent::RunCompleted {
            passed: 1,
            failed: 0,
            skipped: 0,
        });
    }

    #[test]
    fn events_serialize() {
        let event = RunEvent::CaseFinished {
            case: Case::new().with("env", "dev"),
            status: CaseStatus::Passed,
            finished: 3,
        };
        let json = serde_json::to_string(&event);
        assert!(json.is_ok());
    }
}
