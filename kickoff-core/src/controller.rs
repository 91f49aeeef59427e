//! Initialization controller
//!
//! Drives the initialization screens of one client: subscribes to the
//! registry, selects and renders a screen on every snapshot, re-renders on
//! viewport resize, and detaches once the registry is ready.
//!
//! All controller state lives in a single task. The handle only cancels it
//! and waits for it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::model::{StatusSnapshot, Viewport};
use crate::registry::PluginRegistry;
use crate::selector::ScreenSelector;
use crate::view::Renderer;

/// Current size of the render container, updated on resize
pub type ViewportSource = watch::Receiver<Viewport>;

/// A viewport that never changes
pub fn fixed_viewport(viewport: Viewport) -> ViewportSource {
    let (_tx, rx) = watch::channel(viewport);
    rx
}

pub type StartHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct ControllerOptions {
    /// Label used in logs
    pub client: String,
    pub selector: ScreenSelector,
    /// Runs once, on the first snapshot
    pub on_start: Option<StartHook>,
}

impl ControllerOptions {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            ..Default::default()
        }
    }

    pub fn with_selector(mut self, selector: ScreenSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn on_start(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Every plugin completed
    Ready,
    Disposed,
    /// The registry stopped publishing snapshots
    RegistryClosed,
    /// The controller task panicked
    Aborted,
}

pub struct ControllerHandle {
    token: CancellationToken,
    task: JoinHandle<ExitReason>,
}

impl ControllerHandle {
    /// Stop rendering. Safe to call after the controller exited.
    pub fn dispose(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn finished(self) -> ExitReason {
        match self.task.await {
            Ok(reason) => reason,
            Err(err) => {
                tracing::error!(error = %err, "controller task failed");
                ExitReason::Aborted
            }
        }
    }
}

/// Start the controller task
pub fn attach<R>(
    registry: Arc<dyn PluginRegistry>,
    renderer: R,
    viewport: ViewportSource,
    options: ControllerOptions,
) -> ControllerHandle
where
    R: Renderer + 'static,
{
    let token = CancellationToken::new();
    let task = tokio::spawn(run(registry, renderer, viewport, options, token.clone()));
    ControllerHandle { token, task }
}

async fn run<R: Renderer>(
    registry: Arc<dyn PluginRegistry>,
    mut renderer: R,
    mut viewport: ViewportSource,
    options: ControllerOptions,
    token: CancellationToken,
) -> ExitReason {
    let ControllerOptions {
        client,
        selector,
        mut on_start,
    } = options;

    let mut subscription = registry.observe();
    let ready = registry.ready();
    tokio::pin!(ready);

    let mut started = false;
    let mut resizes_open = true;
    let mut current: Option<StatusSnapshot> = None;

    let reason = loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break ExitReason::Disposed,

            _ = &mut ready => break ExitReason::Ready,

            next = subscription.next() => {
                let Some(snapshot) = next else {
                    break ExitReason::RegistryClosed;
                };

                if !started {
                    started = true;
                    // only resizes from now on are of interest
                    viewport.borrow_and_update();
                    if let Some(hook) = on_start.take() {
                        hook();
                    }
                    tracing::debug!(client = %client, "initialization screens started");
                }

                let size = *viewport.borrow();
                paint(&mut renderer, &selector, &snapshot, registry.as_ref(), size, &client);
                current = Some(snapshot);
            }

            changed = viewport.changed(), if started && resizes_open => {
                if changed.is_err() {
                    resizes_open = false;
                    continue;
                }

                let size = *viewport.borrow_and_update();
                if let Some(snapshot) = &current {
                    paint(&mut renderer, &selector, snapshot, registry.as_ref(), size, &client);
                }
            }
        }
    };

    subscription.close();
    tracing::debug!(client = %client, reason = ?reason, "initialization screens detached");
    reason
}

fn paint<R: Renderer>(
    renderer: &mut R,
    selector: &ScreenSelector,
    snapshot: &StatusSnapshot,
    registry: &dyn PluginRegistry,
    viewport: Viewport,
    client: &str,
) {
    let screen = selector.select(snapshot, registry, viewport);
    tracing::trace!(client = %client, screen = screen.kind().label(), "render");

    if let Err(err) = renderer.render(&screen, viewport) {
        tracing::error!(client = %client, screen = screen.kind().label(), error = %err, "render failed");
    }
}
