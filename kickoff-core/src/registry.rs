//! Plugin status registry
//!
//! The registry is the data source of the launcher: it knows every plugin a
//! client registered, pushes a [`StatusSnapshot`] on every change, and tells
//! when all plugins are done initializing.
//!
//! [`PluginRegistry`] is the contract the launcher consumes. [`StatusRegistry`]
//! is the in-memory implementation used by clients built on this crate and by
//! tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::model::{PluginId, PluginKind, PluginStatus, StatusSnapshot};
use crate::plugin::{PlatformState, PluginInfo, PluginState};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin not found: {id}")]
    NotFound { id: PluginId },
    #[error("plugin already registered: {id}")]
    AlreadyRegistered { id: PluginId },
    #[error("plugin {id} does not accept user gestures")]
    GestureNotSupported { id: PluginId },
    #[error("plugin {id} has no platform state")]
    NotPlatform { id: PluginId },
}

/// Resolve a plugin id to its current description
pub trait PluginLookup {
    fn plugin(&self, id: &str) -> Result<PluginInfo, RegistryError>;
}

impl PluginLookup for [PluginInfo] {
    fn plugin(&self, id: &str) -> Result<PluginInfo, RegistryError> {
        self.iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }
}

impl PluginLookup for Vec<PluginInfo> {
    fn plugin(&self, id: &str) -> Result<PluginInfo, RegistryError> {
        self.as_slice().plugin(id)
    }
}

/// Contract of a plugin registry as consumed by the launcher
#[async_trait]
pub trait PluginRegistry: PluginLookup + Send + Sync {
    /// Subscribe to snapshots. The subscription yields the current snapshot
    /// first, then one snapshot per change.
    fn observe(&self) -> Subscription;

    /// All registered plugins, in registration order
    fn plugins(&self) -> Vec<PluginInfo>;

    /// Resolves once every registered plugin has completed
    async fn ready(&self);

    /// Forward a user gesture to a plugin that waits for one
    fn activate(&self, id: &str) -> Result<(), RegistryError>;
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle on a stream of snapshots, ended with [`Subscription::close`]
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<StatusSnapshot>,
    delivered_initial: bool,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(rx: watch::Receiver<StatusSnapshot>) -> Self {
        Self {
            rx,
            delivered_initial: false,
            token: CancellationToken::new(),
        }
    }

    /// Next snapshot, or `None` once closed or once the registry is gone
    pub async fn next(&mut self) -> Option<StatusSnapshot> {
        if self.token.is_cancelled() {
            return None;
        }

        if !self.delivered_initial {
            self.delivered_initial = true;
            return Some(self.rx.borrow_and_update().clone());
        }

        tokio::select! {
            _ = self.token.cancelled() => None,
            changed = self.rx.changed() => match changed {
                Ok(()) => Some(self.rx.borrow_and_update().clone()),
                Err(_) => None,
            },
        }
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// In-memory registry
// ============================================================================

#[derive(Clone, Debug)]
struct Entry {
    info: PluginInfo,
    ready: bool,
}

#[derive(Clone, Debug, Default)]
struct RegistryState {
    entries: Vec<Entry>,
}

impl RegistryState {
    /// Ready plugins are no longer part of the snapshot view
    fn snapshot(&self) -> StatusSnapshot {
        self.entries
            .iter()
            .filter(|e| !e.ready)
            .map(|e| (e.info.id.clone(), e.info.status))
            .collect()
    }

    fn all_ready(&self) -> bool {
        self.entries.iter().all(|e| e.ready)
    }

    fn find(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.info.id == id)
    }
}

/// In-memory [`PluginRegistry`] backed by watch channels
#[derive(Clone)]
pub struct StatusRegistry {
    state: Arc<watch::Sender<RegistryState>>,
    snapshots: Arc<watch::Sender<StatusSnapshot>>,
    gestures: broadcast::Sender<PluginId>,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RegistryState::default());
        let (snapshots, _) = watch::channel(StatusSnapshot::new());
        let (gestures, _) = broadcast::channel(64);

        Self {
            state: Arc::new(state),
            snapshots: Arc::new(snapshots),
            gestures,
        }
    }

    /// Register a plugin with status `idle`
    pub fn register(&self, id: impl Into<PluginId>, kind: PluginKind) -> Result<(), RegistryError> {
        let info = PluginInfo::new(id, kind);
        let id = info.id.clone();

        let inserted = self.state.send_if_modified(|state| {
            if state.find(&info.id).is_some() {
                return false;
            }
            state.entries.push(Entry { info, ready: false });
            true
        });

        if !inserted {
            return Err(RegistryError::AlreadyRegistered { id });
        }

        tracing::debug!(plugin = %id, kind = kind.label(), "plugin registered");
        self.publish();
        Ok(())
    }

    pub fn set_status(&self, id: &str, status: PluginStatus) -> Result<(), RegistryError> {
        self.update(id, |entry| entry.info.status = status)?;
        tracing::debug!(plugin = %id, status = status.label(), "plugin status changed");
        Ok(())
    }

    pub fn set_state(&self, id: &str, state: PluginState) -> Result<(), RegistryError> {
        self.update(id, |entry| entry.info.state = state)
    }

    /// Mutate the platform state of a platform plugin
    pub fn update_platform<F>(&self, id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut PlatformState),
    {
        let applied = self.update(id, |entry| match &mut entry.info.state {
            PluginState::Platform(state) => {
                f(state);
                true
            }
            _ => false,
        })?;

        if applied {
            Ok(())
        } else {
            Err(RegistryError::NotPlatform { id: id.to_string() })
        }
    }

    /// Terminal success: the plugin leaves the snapshot view
    pub fn mark_ready(&self, id: &str) -> Result<(), RegistryError> {
        self.update(id, |entry| entry.ready = true)?;
        tracing::debug!(plugin = %id, "plugin ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().all_ready()
    }

    /// Ids of plugins receiving a user gesture, as they are activated
    pub fn gestures(&self) -> broadcast::Receiver<PluginId> {
        self.gestures.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state.borrow().snapshot()
    }

    fn update<R>(&self, id: &str, f: impl FnOnce(&mut Entry) -> R) -> Result<R, RegistryError> {
        let mut out = None;

        self.state.send_if_modified(|state| {
            match state.entries.iter_mut().find(|e| e.info.id == id) {
                Some(entry) => {
                    out = Some(f(entry));
                    true
                }
                None => false,
            }
        });

        match out {
            Some(value) => {
                self.publish();
                Ok(value)
            }
            None => Err(RegistryError::NotFound { id: id.to_string() }),
        }
    }

    /// Observers are notified on every mutation, including state-only ones,
    /// so progress messages refresh even when no status moved.
    fn publish(&self) {
        let snapshot = self.state.borrow().snapshot();
        self.snapshots.send_replace(snapshot);
    }
}

impl PluginLookup for StatusRegistry {
    fn plugin(&self, id: &str) -> Result<PluginInfo, RegistryError> {
        self.state
            .borrow()
            .find(id)
            .map(|e| e.info.clone())
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }
}

#[async_trait]
impl PluginRegistry for StatusRegistry {
    fn observe(&self) -> Subscription {
        Subscription::new(self.snapshots.subscribe())
    }

    fn plugins(&self) -> Vec<PluginInfo> {
        self.state
            .borrow()
            .entries
            .iter()
            .map(|e| e.info.clone())
            .collect()
    }

    async fn ready(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.all_ready()).await;
    }

    fn activate(&self, id: &str) -> Result<(), RegistryError> {
        let kind = self
            .state
            .borrow()
            .find(id)
            .map(|e| e.info.kind)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;

        if !kind.requires_user_gesture() {
            return Err(RegistryError::GestureNotSupported { id: id.to_string() });
        }

        // nobody listening is fine, the plugin may not be waiting yet
        let _ = self.gestures.send(id.to_string());
        tracing::debug!(plugin = %id, "user gesture forwarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::plugin::{PlatformStep, StepResult};

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = StatusRegistry::new();
        registry.register("sync", PluginKind::Sync).unwrap();
        let err = registry.register("sync", PluginKind::Sync).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered { id: "sync".into() });
    }

    #[test]
    fn test_lookup_unknown_plugin() {
        let registry = StatusRegistry::new();
        assert!(matches!(
            registry.plugin("nope"),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.set_status("nope", PluginStatus::Started),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_ready_plugins_leave_snapshot() {
        let registry = StatusRegistry::new();
        registry.register("a", PluginKind::Generic).unwrap();
        registry.register("b", PluginKind::Generic).unwrap();
        registry.set_status("a", PluginStatus::Started).unwrap();
        registry.mark_ready("a").unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.ids(), vec!["b"]);
        assert!(!registry.is_ready());

        registry.mark_ready("b").unwrap();
        assert!(registry.is_ready());
        // still resolvable after completion
        assert!(registry.plugin("a").is_ok());
    }

    #[test]
    fn test_update_platform_requires_platform_state() {
        let registry = StatusRegistry::new();
        registry.register("platform", PluginKind::Platform).unwrap();
        registry.register("sync", PluginKind::Sync).unwrap();

        registry
            .update_platform("platform", |s| {
                s.set(PlatformStep::AvailabilityCheck, StepResult::passed())
            })
            .unwrap();
        let info = registry.plugin("platform").unwrap();
        assert_eq!(
            info.platform_state().unwrap().current_step(),
            Some(PlatformStep::Authorization)
        );

        assert_eq!(
            registry.update_platform("sync", |_| {}),
            Err(RegistryError::NotPlatform { id: "sync".into() })
        );
    }

    #[test]
    fn test_activate_checks_kind() {
        let registry = StatusRegistry::new();
        registry.register("platform", PluginKind::Platform).unwrap();
        registry.register("sync", PluginKind::Sync).unwrap();
        let mut gestures = registry.gestures();

        registry.activate("platform").unwrap();
        assert_eq!(gestures.try_recv().unwrap(), "platform");

        assert_eq!(
            registry.activate("sync"),
            Err(RegistryError::GestureNotSupported { id: "sync".into() })
        );
        assert!(matches!(
            registry.activate("position"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscription_yields_current_then_changes() {
        let registry = StatusRegistry::new();
        registry.register("a", PluginKind::Generic).unwrap();

        let mut sub = registry.observe();
        let first = sub.next().await.unwrap();
        assert_eq!(first.get("a"), Some(PluginStatus::Idle));

        registry.set_status("a", PluginStatus::Started).unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(second.get("a"), Some(PluginStatus::Started));

        sub.close();
        assert!(sub.is_closed());
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_ready_resolves_when_all_plugins_done() {
        let registry = StatusRegistry::new();
        registry.register("a", PluginKind::Generic).unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.ready().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        registry.mark_ready("a").unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("ready should resolve")
            .unwrap();
    }
}
