//! One demo client: simulated plugins, connection, init screens and QoS

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use kickoff_core::config::{LauncherConfig, PluginConfig};
use kickoff_core::controller::{self, ControllerHandle, ControllerOptions};
use kickoff_core::i18n::LanguageData;
use kickoff_core::model::Viewport;
use kickoff_core::orchestrator::{ClientHandle, Container};
use kickoff_core::qos::{self, QosHandle, QosPolicy, ReloadAction, Visibility};
use kickoff_core::registry::{RegistryError, StatusRegistry};
use kickoff_core::selector::ScreenSelector;
use kickoff_core::view::{AppInfo, Renderer};

use crate::connection::SimulatedConnection;
use crate::demo::{self, PluginTasks};

/// Everything a client needs from the config
#[derive(Clone)]
pub struct ClientSettings {
    pub app: AppInfo,
    pub texts: LanguageData,
    pub plugins: Vec<PluginConfig>,
    pub qos: QosPolicy,
    pub selector: ScreenSelector,
    pub drop_after: Option<Duration>,
}

impl ClientSettings {
    pub fn from_config(config: &LauncherConfig, texts: LanguageData) -> Self {
        Self {
            app: config.app.clone(),
            texts,
            plugins: config.plugins.clone(),
            qos: config.qos.clone(),
            selector: ScreenSelector::new(config.error_policy),
            drop_after: config.connection.drop_after_ms.map(Duration::from_millis),
        }
    }
}

pub struct DemoClient {
    handle: ClientHandle,
    registry: StatusRegistry,
    connection: SimulatedConnection,
    visibility: watch::Sender<Visibility>,
    viewport: watch::Sender<Viewport>,
    controller: ControllerHandle,
    qos: QosHandle,
    plugins: PluginTasks,
}

impl DemoClient {
    pub fn start<R, A>(
        container: &Container,
        settings: &ClientSettings,
        renderer: R,
        reload: A,
    ) -> Result<Self, RegistryError>
    where
        R: Renderer + 'static,
        A: ReloadAction,
    {
        let registry = StatusRegistry::new();
        demo::register(&registry, &settings.plugins)?;

        let handle = ClientHandle::new(container, Arc::new(registry.clone()));
        let label = format!("client-{}", container.index);

        let (viewport, viewport_rx) = watch::channel(container.viewport);
        let controller = controller::attach(
            handle.registry().clone(),
            renderer,
            viewport_rx,
            ControllerOptions::new(label.clone())
                .with_selector(settings.selector)
                .on_start(move || tracing::debug!(client = %label, "first status received")),
        );

        let connection = SimulatedConnection::new();
        let (visibility, visibility_rx) = watch::channel(Visibility::Visible);
        let qos = qos::arm(
            connection.subscribe(),
            visibility_rx,
            settings.qos.clone(),
            reload,
        );

        if let Some(after) = settings.drop_after {
            connection.schedule_drop(after);
        }

        let plugins = demo::spawn(&registry, &settings.plugins, handle.token());

        Ok(Self {
            handle,
            registry,
            connection,
            visibility,
            viewport,
            controller,
            qos,
            plugins,
        })
    }

    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    pub fn index(&self) -> usize {
        self.handle.index()
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    pub fn connection(&self) -> &SimulatedConnection {
        &self.connection
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.send_replace(visibility);
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    pub fn resize(&self, viewport: Viewport) {
        self.viewport.send_if_modified(|current| {
            if *current == viewport {
                return false;
            }
            *current = viewport;
            true
        });
    }

    /// Resolves when a plugin driver fails: error or panic.
    ///
    /// Pending forever once every driver finished cleanly.
    pub async fn failure(&mut self) -> String {
        while let Some(joined) = self.plugins.join_next().await {
            match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => return err.to_string(),
                Err(err) if err.is_panic() => return format!("plugin task panicked: {}", err),
                Err(_) => continue,
            }
        }
        std::future::pending().await
    }

    /// Stop the client: no reload, no render, connection closed
    pub async fn stop(mut self) {
        self.qos.disarm();
        self.handle.shutdown();
        self.connection.close();
        self.controller.dispose();
        self.plugins.shutdown().await;

        let reason = self.controller.finished().await;
        tracing::info!(client = self.handle.index(), reason = ?reason, "client stopped");
    }
}
