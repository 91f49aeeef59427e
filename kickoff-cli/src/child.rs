//! Headless client, run by the process supervisor
//!
//! Screens go to the log and user gestures are sent automatically. A reload
//! or a failing plugin ends the client. A reload always exits for a respawn.
//! A failure does so with `restart_on_error`; otherwise the process stays up
//! with its client stopped until it is signalled.

use std::future::Future;

use tokio::sync::mpsc;

use kickoff_core::orchestrator::Container;
use kickoff_core::qos::ReloadReason;

use crate::client::{ClientSettings, DemoClient};
use crate::demo;
use crate::error::AppError;
use crate::render::LogRenderer;

/// Exit code asking the supervisor for a respawn
pub const RESPAWN_EXIT_CODE: i32 = 75;

#[derive(Debug, PartialEq, Eq)]
pub enum ChildExit {
    Interrupted,
    Reload(ReloadReason),
    Failed(String),
}

impl ChildExit {
    /// `None` keeps the process alive until it is signalled
    pub fn exit_code(&self, restart_on_error: bool) -> Option<i32> {
        match self {
            ChildExit::Interrupted => Some(0),
            ChildExit::Reload(_) => Some(RESPAWN_EXIT_CODE),
            ChildExit::Failed(_) if restart_on_error => Some(RESPAWN_EXIT_CODE),
            ChildExit::Failed(_) => None,
        }
    }
}

pub async fn run(container: Container, settings: ClientSettings, restart_on_error: bool) -> Result<i32, AppError> {
    run_until(container, settings, restart_on_error, shutdown_signal()).await
}

async fn run_until<S>(
    container: Container,
    settings: ClientSettings,
    restart_on_error: bool,
    shutdown: S,
) -> Result<i32, AppError>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let label = format!("client-{}", container.index);
    let renderer = LogRenderer::new(label, settings.app.clone(), settings.texts.clone());

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let reload = move |reason: ReloadReason| {
        let _ = reload_tx.send(reason);
    };

    let mut client = DemoClient::start(&container, &settings, renderer, reload)?;
    let gestures = tokio::spawn(demo::auto_gesture(
        client.registry().clone(),
        client.handle().token().clone(),
    ));
    tracing::info!(client = container.index, id = %container.client_id, "client started");

    let exit = tokio::select! {
        _ = &mut shutdown => ChildExit::Interrupted,
        Some(reason) = reload_rx.recv() => ChildExit::Reload(reason),
        message = client.failure() => ChildExit::Failed(message),
    };

    match &exit {
        ChildExit::Interrupted => tracing::info!("interrupted"),
        ChildExit::Reload(reason) => tracing::warn!(reason = %reason, "reload requested"),
        ChildExit::Failed(message) => tracing::error!(error = %message, "client failed"),
    }

    client.stop().await;
    let _ = gestures.await;

    match exit.exit_code(restart_on_error) {
        Some(code) => Ok(code),
        None => {
            tracing::info!("client stopped, waiting for a signal");
            shutdown.await;
            Ok(0)
        }
    }
}

/// Ctrl-C, or SIGTERM from the supervisor
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
