//! Multi-client orchestration
//!
//! Launches one or more clients in this process, each in its own container.
//! With more than one client, a single "start all" control is armed as soon
//! as any client registers a plugin waiting for a user gesture; activating
//! it forwards the gesture to every such plugin of every client.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::model::Viewport;
use crate::registry::{PluginRegistry, RegistryError};

#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    pub count: usize,
    /// Size of each container
    pub viewport: Viewport,
}

impl OrchestratorOptions {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            viewport: Viewport::new(80, 24),
        }
    }
}

/// Where one client lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub index: usize,
    pub client_id: String,
    pub viewport: Viewport,
}

/// One running client
#[derive(Clone)]
pub struct ClientHandle {
    index: usize,
    client_id: String,
    registry: Arc<dyn PluginRegistry>,
    token: CancellationToken,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("index", &self.index)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientHandle {
    pub fn new(container: &Container, registry: Arc<dyn PluginRegistry>) -> Self {
        Self {
            index: container.index,
            client_id: container.client_id.clone(),
            registry,
            token: CancellationToken::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn registry(&self) -> &Arc<dyn PluginRegistry> {
        &self.registry
    }

    /// Cancelled when the client is torn down. Client tasks select on it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("client {index} failed to start: {reason}")]
    Failed { index: usize, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("clients already launched")]
    AlreadyLaunched,
    #[error("orchestrator disposed")]
    Disposed,
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

#[derive(Debug, thiserror::Error)]
pub enum StartAllError {
    #[error("start-all control is not armed (state: {0:?})")]
    NotArmed(StartAllControl),
}

/// Builds a client inside a container
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn bootstrap(&self, container: Container) -> Result<ClientHandle, BootstrapError>;
}

/// State of the collective "start all" control
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartAllControl {
    #[default]
    Hidden,
    /// Shown, waiting for the gesture
    Armed,
    /// Activated and removed
    Done,
}

pub struct Orchestrator {
    options: OrchestratorOptions,
    clients: Vec<ClientHandle>,
    control: Arc<watch::Sender<StartAllControl>>,
    watchers: Vec<JoinHandle<()>>,
    token: CancellationToken,
    launched: bool,
}

impl Orchestrator {
    pub fn create(options: OrchestratorOptions) -> Result<Self, ConfigError> {
        if options.count == 0 {
            return Err(ConfigError::Invalid("client count must be at least 1".into()));
        }

        let (control, _) = watch::channel(StartAllControl::Hidden);

        Ok(Self {
            options,
            clients: Vec::new(),
            control: Arc::new(control),
            watchers: Vec::new(),
            token: CancellationToken::new(),
            launched: false,
        })
    }

    pub fn count(&self) -> usize {
        self.options.count
    }

    /// Bootstrap every client, in container order
    pub async fn launch<B>(&mut self, bootstrap: &B) -> Result<(), LaunchError>
    where
        B: Bootstrap + ?Sized,
    {
        if self.token.is_cancelled() {
            return Err(LaunchError::Disposed);
        }
        if self.launched {
            return Err(LaunchError::AlreadyLaunched);
        }
        self.launched = true;

        for index in 0..self.options.count {
            let container = Container {
                index,
                client_id: uuid::Uuid::new_v4().to_string(),
                viewport: self.options.viewport,
            };

            let client = bootstrap.bootstrap(container).await?;
            tracing::info!(client = client.index(), id = %client.client_id(), "client launched");

            if self.options.count > 1 {
                self.watchers.push(tokio::spawn(watch_for_gesture(
                    client.clone(),
                    self.control.clone(),
                    self.token.child_token(),
                )));
            }

            self.clients.push(client);
        }

        Ok(())
    }

    pub fn clients(&self) -> &[ClientHandle] {
        &self.clients
    }

    pub fn start_all_state(&self) -> StartAllControl {
        *self.control.borrow()
    }

    pub fn start_all_control(&self) -> watch::Receiver<StartAllControl> {
        self.control.subscribe()
    }

    /// Forward the gesture to every gesture-waiting plugin of every client.
    ///
    /// Returns how many plugins received it. The control is removed
    /// afterwards and never shown again.
    pub fn start_all(&self) -> Result<usize, StartAllError> {
        let state = self.start_all_state();
        if state != StartAllControl::Armed {
            return Err(StartAllError::NotArmed(state));
        }

        let mut forwarded = 0;
        for client in &self.clients {
            let registry = client.registry();
            for plugin in registry.plugins() {
                if !plugin.kind.requires_user_gesture() {
                    continue;
                }
                match registry.activate(&plugin.id) {
                    Ok(()) => forwarded += 1,
                    Err(err) => {
                        tracing::warn!(client = client.index(), plugin = %plugin.id, error = %err, "gesture not forwarded");
                    }
                }
            }
        }

        self.control.send_replace(StartAllControl::Done);
        tracing::info!(forwarded, "start-all activated");
        Ok(forwarded)
    }

    /// Tear down every client. The orchestrator cannot launch again.
    pub fn dispose(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        for client in self.clients.drain(..) {
            client.shutdown();
        }
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
        tracing::debug!("orchestrator disposed");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn watch_for_gesture(
    client: ClientHandle,
    control: Arc<watch::Sender<StartAllControl>>,
    token: CancellationToken,
) {
    let registry = client.registry().clone();
    let mut subscription = registry.observe();
    let mut control_rx = control.subscribe();

    loop {
        if *control_rx.borrow_and_update() != StartAllControl::Hidden {
            break;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = client.token().cancelled() => break,
            changed = control_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            next = subscription.next() => {
                if next.is_none() {
                    break;
                }

                let needs_gesture = registry
                    .plugins()
                    .iter()
                    .any(|p| p.kind.requires_user_gesture());

                if needs_gesture {
                    let armed = control.send_if_modified(|state| {
                        if *state == StartAllControl::Hidden {
                            *state = StartAllControl::Armed;
                            true
                        } else {
                            false
                        }
                    });
                    if armed {
                        tracing::info!(client = client.index(), "start-all control armed");
                    }
                    break;
                }
            }
        }
    }

    subscription.close();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::PluginKind;
    use crate::registry::StatusRegistry;

    /// Registers `platform` on the clients listed, `sync` everywhere
    struct Fixture {
        platform_on: Vec<usize>,
        registries: std::sync::Mutex<Vec<StatusRegistry>>,
    }

    impl Fixture {
        fn new(platform_on: Vec<usize>) -> Self {
            Self {
                platform_on,
                registries: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Bootstrap for Fixture {
        async fn bootstrap(&self, container: Container) -> Result<ClientHandle, BootstrapError> {
            let registry = StatusRegistry::new();
            registry.register("sync", PluginKind::Sync)?;
            if self.platform_on.contains(&container.index) {
                registry.register("platform", PluginKind::Platform)?;
            }
            self.registries.lock().unwrap().push(registry.clone());
            Ok(ClientHandle::new(&container, Arc::new(registry)))
        }
    }

    struct Failing;

    #[async_trait]
    impl Bootstrap for Failing {
        async fn bootstrap(&self, container: Container) -> Result<ClientHandle, BootstrapError> {
            Err(BootstrapError::Failed {
                index: container.index,
                reason: "no container".into(),
            })
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[test]
    fn test_create_rejects_zero_clients() {
        assert!(matches!(
            Orchestrator::create(OrchestratorOptions::new(0)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_client_has_no_start_all() {
        let mut orchestrator = Orchestrator::create(OrchestratorOptions::new(1)).unwrap();
        orchestrator.launch(&Fixture::new(vec![0])).await.unwrap();
        settle().await;

        assert_eq!(orchestrator.clients().len(), 1);
        assert_eq!(orchestrator.start_all_state(), StartAllControl::Hidden);
        assert!(matches!(
            orchestrator.start_all(),
            Err(StartAllError::NotArmed(StartAllControl::Hidden))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_forwards_to_every_client() {
        let fixture = Fixture::new(vec![0, 1, 2]);
        let mut orchestrator = Orchestrator::create(OrchestratorOptions::new(3)).unwrap();
        orchestrator.launch(&fixture).await.unwrap();

        let mut gestures: Vec<_> = fixture
            .registries
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.gestures())
            .collect();

        settle().await;
        assert_eq!(orchestrator.start_all_state(), StartAllControl::Armed);

        assert_eq!(orchestrator.start_all().unwrap(), 3);
        for rx in &mut gestures {
            assert_eq!(rx.try_recv().unwrap(), "platform");
        }
        assert_eq!(orchestrator.start_all_state(), StartAllControl::Done);

        // removed for good
        assert!(orchestrator.start_all().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_platform_client_arms_once() {
        let fixture = Fixture::new(vec![1]);
        let mut orchestrator = Orchestrator::create(OrchestratorOptions::new(3)).unwrap();
        let mut control = orchestrator.start_all_control();
        orchestrator.launch(&fixture).await.unwrap();

        settle().await;
        assert!(control.has_changed().unwrap());
        assert_eq!(*control.borrow_and_update(), StartAllControl::Armed);

        // a late platform elsewhere does not re-arm
        fixture.registries.lock().unwrap()[0]
            .register("platform", PluginKind::Platform)
            .unwrap();
        settle().await;
        assert!(!control.has_changed().unwrap());

        assert_eq!(orchestrator.start_all().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_errors() {
        let mut orchestrator = Orchestrator::create(OrchestratorOptions::new(2)).unwrap();
        assert!(matches!(
            orchestrator.launch(&Failing).await,
            Err(LaunchError::Bootstrap(BootstrapError::Failed { index: 0, .. }))
        ));
        assert!(matches!(
            orchestrator.launch(&Fixture::new(vec![])).await,
            Err(LaunchError::AlreadyLaunched)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_shuts_clients_down() {
        let fixture = Fixture::new(vec![]);
        let mut orchestrator = Orchestrator::create(OrchestratorOptions::new(2)).unwrap();
        orchestrator.launch(&fixture).await.unwrap();

        let tokens: Vec<_> = orchestrator.clients().iter().map(|c| c.token().clone()).collect();
        orchestrator.dispose();

        assert!(orchestrator.clients().is_empty());
        assert!(tokens.iter().all(|t| t.is_cancelled()));
        assert!(matches!(
            orchestrator.launch(&fixture).await,
            Err(LaunchError::Disposed)
        ));
    }
}
