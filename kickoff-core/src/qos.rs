//! Reload supervision
//!
//! Watches the client connection and its visibility, and reloads the client
//! after a short delay when the connection drops or the client is hidden.
//! The first trigger wins: once a reload is scheduled, further signals are
//! ignored and the reload cannot be called off.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Closed,
    Error(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadReason {
    SocketClosed,
    SocketError(String),
    Hidden,
}

impl std::fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadReason::SocketClosed => write!(f, "socket closed"),
            ReloadReason::SocketError(reason) => write!(f, "socket error: {}", reason),
            ReloadReason::Hidden => write!(f, "client hidden"),
        }
    }
}

/// What a reload does, supplied by the caller
pub trait ReloadAction: Send + 'static {
    fn reload(self, reason: ReloadReason);
}

impl<F> ReloadAction for F
where
    F: FnOnce(ReloadReason) + Send + 'static,
{
    fn reload(self, reason: ReloadReason) {
        self(reason)
    }
}

fn default_true() -> bool {
    true
}

fn default_socket_delay() -> u64 {
    500
}

fn default_visibility_delay() -> u64 {
    50
}

/// Which signals reload the client, and after how long
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosPolicy {
    #[serde(default = "default_true")]
    pub reload_on_socket_close: bool,
    #[serde(default = "default_true")]
    pub reload_on_socket_error: bool,
    #[serde(default = "default_true")]
    pub reload_on_hidden_visibility: bool,
    #[serde(default = "default_socket_delay")]
    pub socket_close_delay_ms: u64,
    #[serde(default = "default_socket_delay")]
    pub socket_error_delay_ms: u64,
    /// Hidden notifications arrive slightly before the change is effective
    #[serde(default = "default_visibility_delay")]
    pub visibility_delay_ms: u64,
}

impl Default for QosPolicy {
    fn default() -> Self {
        Self {
            reload_on_socket_close: true,
            reload_on_socket_error: true,
            reload_on_hidden_visibility: true,
            socket_close_delay_ms: default_socket_delay(),
            socket_error_delay_ms: default_socket_delay(),
            visibility_delay_ms: default_visibility_delay(),
        }
    }
}

impl QosPolicy {
    /// Longer socket delays, leaving a restarting server more time
    pub fn conservative() -> Self {
        Self {
            socket_close_delay_ms: 2000,
            socket_error_delay_ms: 2000,
            ..Self::default()
        }
    }

    /// Nothing triggers a reload
    pub fn disabled() -> Self {
        Self {
            reload_on_socket_close: false,
            reload_on_socket_error: false,
            reload_on_hidden_visibility: false,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, reason: &ReloadReason) -> Duration {
        let ms = match reason {
            ReloadReason::SocketClosed => self.socket_close_delay_ms,
            ReloadReason::SocketError(_) => self.socket_error_delay_ms,
            ReloadReason::Hidden => self.visibility_delay_ms,
        };
        Duration::from_millis(ms)
    }

    fn reloads_on(&self, event: &ConnectionEvent) -> Option<ReloadReason> {
        match event {
            ConnectionEvent::Closed if self.reload_on_socket_close => Some(ReloadReason::SocketClosed),
            ConnectionEvent::Error(reason) if self.reload_on_socket_error => {
                Some(ReloadReason::SocketError(reason.clone()))
            }
            _ => None,
        }
    }
}

pub struct QosHandle {
    token: CancellationToken,
    task: JoinHandle<Option<ReloadReason>>,
}

impl QosHandle {
    /// Stop watching. Has no effect on a reload already scheduled.
    pub fn disarm(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Reason of the reload that fired, `None` when disarmed first
    pub async fn finished(self) -> Option<ReloadReason> {
        match self.task.await {
            Ok(reason) => reason,
            Err(err) => {
                tracing::error!(error = %err, "qos task failed");
                None
            }
        }
    }
}

pub fn arm<A>(
    connection: broadcast::Receiver<ConnectionEvent>,
    visibility: watch::Receiver<Visibility>,
    policy: QosPolicy,
    action: A,
) -> QosHandle
where
    A: ReloadAction,
{
    let token = CancellationToken::new();
    let task = tokio::spawn(supervise(connection, visibility, policy, action, token.clone()));
    QosHandle { token, task }
}

async fn supervise<A: ReloadAction>(
    mut connection: broadcast::Receiver<ConnectionEvent>,
    mut visibility: watch::Receiver<Visibility>,
    policy: QosPolicy,
    action: A,
    token: CancellationToken,
) -> Option<ReloadReason> {
    let mut connection_open = policy.reload_on_socket_close || policy.reload_on_socket_error;
    let mut visibility_open = policy.reload_on_hidden_visibility;

    let reason = loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => return None,

            event = connection.recv(), if connection_open => match event {
                Ok(event) => {
                    if let Some(reason) = policy.reloads_on(&event) {
                        break reason;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "qos lagged behind connection events");
                }
                Err(RecvError::Closed) => connection_open = false,
            },

            changed = visibility.changed(), if visibility_open => match changed {
                Ok(()) => {
                    if *visibility.borrow_and_update() == Visibility::Hidden {
                        break ReloadReason::Hidden;
                    }
                }
                Err(_) => visibility_open = false,
            },
        }
    };

    let delay = policy.delay_for(&reason);
    tracing::info!(reason = %reason, delay_ms = delay.as_millis() as u64, "reload scheduled");

    // scheduled reloads are not cancellable
    tokio::time::sleep(delay).await;
    action.reload(reason.clone());
    Some(reason)
}
