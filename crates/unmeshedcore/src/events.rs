use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the poll-execute-submit loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    PollerStarted {
        queues: usize,
        timestamp: DateTime<Utc>,
    },
    WorkReceived {
        count: usize,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        process_id: u64,
        step_id: u64,
        worker: String,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        process_id: u64,
        step_id: u64,
        worker: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        process_id: u64,
        step_id: u64,
        worker: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ResultsSubmitted {
        count: usize,
        timestamp: DateTime<Utc>,
    },
    SubmitFailed {
        count: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
    PollerStopped {
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for client events
///
/// Sending never blocks; events are dropped when nobody listens.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
