//! Synthesis event system for observability.
//!
//! Emits [`SynthesisEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress displays, audit trails) can follow a
//! run without coupling to the orchestrator internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during a synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SynthesisEvent {
    RunStarted {
        request_id: Uuid,
        kind: String,
        material_count: usize,
    },
    StageStarted {
        request_id: Uuid,
        stage: String,
    },
    StageSkipped {
        request_id: Uuid,
        stage: String,
        reason: String,
    },
    StageRetrying {
        request_id: Uuid,
        stage: String,
        attempt: usize,
    },
    StageCompleted {
        request_id: Uuid,
        stage: String,
        duration_ms: u64,
    },
    StageDegraded {
        request_id: Uuid,
        stage: String,
        reason: String,
    },
    QuotaConsumed {
        request_id: Uuid,
        identity: String,
        amount: u64,
    },
    RunCompleted {
        request_id: Uuid,
        diagnostics: usize,
        duration_ms: u64,
    },
    RunFailed {
        request_id: Uuid,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<SynthesisEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: SynthesisEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SynthesisEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();
        let id = Uuid::new_v4();

        emitter.emit(SynthesisEvent::StageRetrying {
            request_id: id,
            stage: "generate".into(),
            attempt: 2,
        });

        match rx.recv().await.unwrap() {
            SynthesisEvent::StageRetrying {
                request_id,
                stage,
                attempt,
            } => {
                assert_eq!(request_id, id);
                assert_eq!(stage, "generate");
                assert_eq!(attempt, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(SynthesisEvent::QuotaConsumed {
            request_id: Uuid::nil(),
            identity: "alice".into(),
            amount: 1,
        });

        let json1 = serde_json::to_string(&rx1.recv().await.unwrap()).unwrap();
        let json2 = serde_json::to_string(&rx2.recv().await.unwrap()).unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(SynthesisEvent::RunFailed {
            request_id: Uuid::nil(),
            error: "something went wrong".into(),
        });
    }
}
