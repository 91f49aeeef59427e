//! Simulated plugins
//!
//! Drives a [`StatusRegistry`] through the lifecycle of the plugins declared
//! in the config: `idle -> inited -> started -> ready | errored`. Platform
//! plugins walk through their capability steps and wait for a user gesture.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use kickoff_core::config::PluginConfig;
use kickoff_core::model::{PluginId, PluginKind, PluginStatus};
use kickoff_core::plugin::{PlatformStep, PluginState, StepResult};
use kickoff_core::registry::{PluginRegistry, RegistryError, StatusRegistry};

const INIT_DELAY: Duration = Duration::from_millis(100);

pub type PluginTasks = JoinSet<Result<(), RegistryError>>;

/// Register every plugin as `idle`
pub fn register(registry: &StatusRegistry, plugins: &[PluginConfig]) -> Result<(), RegistryError> {
    for plugin in plugins {
        let kind = plugin.kind();
        registry.register(plugin.id.clone(), kind)?;

        if let Some(options) = &plugin.position {
            registry.set_state(&plugin.id, PluginState::Position(options.clone()))?;
        }
    }
    Ok(())
}

/// Start one driver task per plugin. Tasks stop when `token` is cancelled.
pub fn spawn(registry: &StatusRegistry, plugins: &[PluginConfig], token: &CancellationToken) -> PluginTasks {
    let mut tasks = JoinSet::new();

    for plugin in plugins {
        let registry = registry.clone();
        let plugin = plugin.clone();
        let token = token.clone();
        // subscribed now so no gesture sent before the wait is lost
        let gestures = registry.gestures();

        tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => Ok(()),
                result = drive(&registry, &plugin, gestures) => result,
            }
        });
    }

    tasks
}

async fn drive(
    registry: &StatusRegistry,
    plugin: &PluginConfig,
    gestures: broadcast::Receiver<String>,
) -> Result<(), RegistryError> {
    let id = plugin.id.as_str();

    tokio::time::sleep(INIT_DELAY).await;
    registry.set_status(id, PluginStatus::Inited)?;
    registry.set_status(id, PluginStatus::Started)?;

    match plugin.kind() {
        PluginKind::Platform => drive_platform(registry, plugin, gestures).await,
        PluginKind::Position
        | PluginKind::Sync
        | PluginKind::AudioBufferLoader
        | PluginKind::Checkin
        | PluginKind::Generic => {
            tokio::time::sleep(Duration::from_millis(plugin.init_ms)).await;
            finish(registry, plugin)
        }
    }
}

async fn drive_platform(
    registry: &StatusRegistry,
    plugin: &PluginConfig,
    mut gestures: broadcast::Receiver<String>,
) -> Result<(), RegistryError> {
    let id = plugin.id.as_str();
    let delay = Duration::from_millis(plugin.init_ms);

    for step in PlatformStep::ORDER {
        if step == PlatformStep::UserGestureWait {
            tracing::debug!(plugin = %id, "waiting for user gesture");
            if !wait_for_gesture(&mut gestures, id).await {
                return Ok(());
            }
        } else {
            tokio::time::sleep(delay).await;
        }

        if plugin.fail_at == Some(step) {
            let features = if plugin.failed_features.is_empty() {
                vec![step.key().to_string()]
            } else {
                plugin.failed_features.clone()
            };
            registry.update_platform(id, |state| state.set(step, StepResult::failed(features)))?;
            registry.set_status(id, PluginStatus::Errored)?;
            tracing::warn!(plugin = %id, step = step.key(), "platform check failed");
            return Ok(());
        }

        registry.update_platform(id, |state| state.set(step, StepResult::passed()))?;
    }

    finish(registry, plugin)
}

fn finish(registry: &StatusRegistry, plugin: &PluginConfig) -> Result<(), RegistryError> {
    if plugin.fails() {
        tracing::warn!(plugin = %plugin.id, "plugin errored");
        registry.set_status(&plugin.id, PluginStatus::Errored)
    } else {
        registry.mark_ready(&plugin.id)
    }
}

/// Deliver the user gesture to every plugin as soon as it waits for one.
///
/// Headless clients have nobody to click. Ends once the registry is ready
/// or `token` is cancelled.
pub async fn auto_gesture(registry: StatusRegistry, token: CancellationToken) {
    let mut subscription = registry.observe();
    let mut delivered: HashSet<PluginId> = HashSet::new();

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = subscription.next() => next,
        };
        if next.is_none() {
            break;
        }

        for plugin in registry.plugins() {
            if !plugin.kind.requires_user_gesture() || delivered.contains(&plugin.id) {
                continue;
            }
            let waiting = plugin.platform_state().and_then(|state| state.current_step())
                == Some(PlatformStep::UserGestureWait);
            if !waiting {
                continue;
            }

            match registry.activate(&plugin.id) {
                Ok(()) => {
                    tracing::info!(plugin = %plugin.id, "user gesture sent automatically");
                    delivered.insert(plugin.id);
                }
                Err(err) => tracing::warn!(plugin = %plugin.id, error = %err, "automatic gesture failed"),
            }
        }

        if registry.is_ready() {
            break;
        }
    }

    subscription.close();
}

/// `false` when the registry went away before the gesture
async fn wait_for_gesture(gestures: &mut broadcast::Receiver<String>, id: &str) -> bool {
    loop {
        match gestures.recv().await {
            Ok(target) if target == id => return true,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return false,
        }
    }
}
