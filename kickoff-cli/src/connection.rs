use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kickoff_core::qos::ConnectionEvent;

/// Stand-in for the client socket. Only its close/error signals matter here.
#[derive(Clone)]
pub struct SimulatedConnection {
    events: broadcast::Sender<ConnectionEvent>,
    closed: CancellationToken,
}

impl SimulatedConnection {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            closed: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Close once. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let _ = self.events.send(ConnectionEvent::Closed);
        tracing::info!("connection closed");
    }

    pub fn fail(&self, reason: impl Into<String>) {
        if self.closed.is_cancelled() {
            return;
        }
        let reason = reason.into();
        tracing::warn!(reason = %reason, "connection error");
        let _ = self.events.send(ConnectionEvent::Error(reason));
    }

    /// Close the connection after `after`, unless it is closed before
    pub fn schedule_drop(&self, after: Duration) -> JoinHandle<()> {
        let connection = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = connection.closed.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    tracing::info!(after_ms = after.as_millis() as u64, "dropping connection");
                    connection.close();
                }
            }
        })
    }
}

impl Default for SimulatedConnection {
    fn default() -> Self {
        Self::new()
    }
}
