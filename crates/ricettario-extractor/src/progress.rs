//! Progress reporting
//!
//! The engine pushes events into an unbounded channel and never waits on the
//! consumer. A dropped receiver silently disables reporting.

use tokio::sync::mpsc;

/// One progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// What is being counted, e.g. `classification` or `batch extraction`
    pub description: String,
    /// Units finished so far
    pub completed: usize,
    /// Units in this phase
    pub total: usize,
}

/// Sending half handed to the engine
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Create a sink and the receiver that consumes its events
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event
    pub fn emit(&self, description: &str, completed: usize, total: usize) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                description: description.to_string(),
                completed,
                total,
            });
        }
    }
}
