use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kickoff_core::controller::{self, ControllerOptions, ExitReason};
use kickoff_core::model::{PluginKind, PluginStatus, Viewport};
use kickoff_core::orchestrator::{
    Bootstrap, BootstrapError, ClientHandle, Container, Orchestrator, OrchestratorOptions,
    StartAllControl,
};
use kickoff_core::plugin::PluginInfo;
use kickoff_core::qos::{self, ConnectionEvent, QosPolicy, ReloadReason, Visibility};
use kickoff_core::registry::StatusRegistry;
use kickoff_core::selector::{self, ScreenDescriptor, ScreenKind};
use kickoff_core::view::RenderError;
use tokio::sync::{broadcast, watch};

fn registry_with(entries: &[(&str, PluginStatus)]) -> StatusRegistry {
    let registry = StatusRegistry::new();
    for (id, status) in entries {
        registry.register(*id, PluginKind::from_id(id)).unwrap();
        registry.set_status(id, *status).unwrap();
    }
    registry
}

fn select(registry: &StatusRegistry) -> ScreenDescriptor {
    selector::select(&registry.snapshot(), registry, Viewport::new(80, 24))
}

#[test]
fn test_platform_started_shows_platform_screen() {
    let registry = registry_with(&[("platform", PluginStatus::Started)]);
    let screen = select(&registry);
    assert_eq!(screen.kind(), ScreenKind::Platform);
}

#[test]
fn test_platform_errored_with_idle_position() {
    let registry = registry_with(&[
        ("platform", PluginStatus::Errored),
        ("position", PluginStatus::Idle),
    ]);
    let screen = select(&registry);
    assert_eq!(screen.kind(), ScreenKind::Errored);
    assert_eq!(screen.plugin_ids(), vec!["platform"]);
}

#[test]
fn test_errored_generic_plugin() {
    let registry = registry_with(&[
        ("a", PluginStatus::Started),
        ("b", PluginStatus::Started),
        ("c", PluginStatus::Errored),
    ]);
    let screen = select(&registry);
    assert_eq!(screen.kind(), ScreenKind::Errored);
    assert_eq!(screen.plugin_ids(), vec!["c"]);
}

#[test]
fn test_default_screen_lists_started() {
    let registry = registry_with(&[("a", PluginStatus::Started), ("b", PluginStatus::Started)]);
    let screen = select(&registry);
    assert_eq!(screen.kind(), ScreenKind::Default);
    assert_eq!(screen.plugin_ids(), vec!["a", "b"]);
    assert_eq!(screen, select(&registry));
}

#[tokio::test(start_paused = true)]
async fn test_render_count_frozen_after_ready() {
    let registry = registry_with(&[("sync", PluginStatus::Idle), ("scripts", PluginStatus::Idle)]);
    let renders = Arc::new(Mutex::new(0usize));

    let counter = renders.clone();
    let handle = controller::attach(
        Arc::new(registry.clone()),
        move |_: &ScreenDescriptor, _: Viewport| -> Result<(), RenderError> {
            *counter.lock().unwrap() += 1;
            Ok(())
        },
        controller::fixed_viewport(Viewport::new(80, 24)),
        ControllerOptions::new("scenario"),
    );

    for id in ["sync", "scripts"] {
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.set_status(id, PluginStatus::Started).unwrap();
    }
    for id in ["sync", "scripts"] {
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.mark_ready(id).unwrap();
    }

    assert_eq!(handle.finished().await, ExitReason::Ready);
    let frozen = *renders.lock().unwrap();
    assert!(frozen >= 3);

    registry.set_status("sync", PluginStatus::Errored).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*renders.lock().unwrap(), frozen);
}

#[tokio::test(start_paused = true)]
async fn test_qos_single_reload_under_double_close() {
    let (conn_tx, conn_rx) = broadcast::channel(8);
    let (_vis_tx, vis_rx) = watch::channel(Visibility::Visible);
    let reloads = Arc::new(Mutex::new(Vec::new()));

    let sink = reloads.clone();
    let handle = qos::arm(conn_rx, vis_rx, QosPolicy::conservative(), move |reason: ReloadReason| {
        sink.lock().unwrap().push(reason)
    });

    conn_tx.send(ConnectionEvent::Closed).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let _ = conn_tx.send(ConnectionEvent::Closed);

    assert_eq!(handle.finished().await, Some(ReloadReason::SocketClosed));
    assert_eq!(reloads.lock().unwrap().len(), 1);
}

struct DemoBootstrap {
    registries: Mutex<Vec<StatusRegistry>>,
}

#[async_trait]
impl Bootstrap for DemoBootstrap {
    async fn bootstrap(&self, container: Container) -> Result<ClientHandle, BootstrapError> {
        let registry = StatusRegistry::new();
        registry.register("platform", PluginKind::Platform)?;
        registry.register("sync", PluginKind::Sync)?;
        self.registries.lock().unwrap().push(registry.clone());
        Ok(ClientHandle::new(&container, Arc::new(registry)))
    }
}

#[tokio::test(start_paused = true)]
async fn test_three_clients_share_one_start_all() {
    let bootstrap = DemoBootstrap {
        registries: Mutex::new(Vec::new()),
    };
    let mut orchestrator = Orchestrator::create(OrchestratorOptions::new(3)).unwrap();
    let mut control = orchestrator.start_all_control();
    orchestrator.launch(&bootstrap).await.unwrap();

    let mut gestures: Vec<_> = bootstrap
        .registries
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.gestures())
        .collect();

    control
        .wait_for(|state| *state == StartAllControl::Armed)
        .await
        .unwrap();

    assert_eq!(orchestrator.start_all().unwrap(), 3);
    for rx in &mut gestures {
        assert_eq!(rx.try_recv().unwrap(), "platform");
    }
    assert_eq!(orchestrator.start_all_state(), StartAllControl::Done);

    let ids: Vec<&str> = orchestrator.clients().iter().map(|c| c.client_id()).collect();
    assert_eq!(ids.len(), 3);
    let platforms: Vec<PluginInfo> = orchestrator.clients()[0].registry().plugins();
    assert_eq!(platforms[0].kind, PluginKind::Platform);

    orchestrator.dispose();
}
