//! Application state management
//! This module wires the link, the registry and its subscribers, and the
//! render thread together, and owns their shared shutdown token.

use std::sync::Arc;

use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::bluetooth::{run_keepalive, ConnectionSupervisor, LivenessMonitor, RadioTransport};
use crate::core::registry::ChannelRegistry;
use crate::dashboard::{RenderThread, TelemetryStore};
use crate::logging::LogHistory;

/// Global application state
pub struct AppState<T: RadioTransport> {
    pub config: AppConfig,
    pub supervisor: Arc<ConnectionSupervisor<T>>,
    pub registry: ChannelRegistry,
    /// Feeds the gauges
    pub store: TelemetryStore,
    /// Raw values for the diagnostic console
    pub diagnostics: TelemetryStore,
    pub render: RenderThread,
    pub logs: Option<LogHistory>,
    shutdown: CancellationToken,
}

impl<T: RadioTransport> AppState<T> {
    /// Creates a new AppState instance and starts the render thread.
    pub fn new(config: AppConfig, transport: Arc<T>, logs: Option<LogHistory>) -> Self {
        let registry = ChannelRegistry::new();
        let shutdown = CancellationToken::new();

        info!("Initializing ConnectionSupervisor for {}...", config.link.device_name);
        let supervisor = Arc::new(ConnectionSupervisor::new(
            transport,
            registry.clone(),
            config.link.device_name.clone(),
        ));

        let store = TelemetryStore::new();
        store.attach(&registry);
        let diagnostics = TelemetryStore::new();
        diagnostics.attach(&registry);

        let render = RenderThread::spawn(store.clone(), &config.dashboard, shutdown.child_token());

        Self {
            config,
            supervisor,
            registry,
            store,
            diagnostics,
            render,
            logs,
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts the liveness monitor and, when configured, the keepalive loop.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let link = &self.config.link;
        let monitor = LivenessMonitor::new(
            self.supervisor.clone(),
            link.liveness_interval(),
            link.reconnect_timeout(),
        );
        let mut tasks = vec![tokio::spawn(monitor.run(self.shutdown.child_token()))];

        if let Some(interval) = link.keepalive_interval() {
            tasks.push(tokio::spawn(run_keepalive(
                self.supervisor.clone(),
                interval,
                link.keepalive_payload.clone(),
                self.shutdown.child_token(),
            )));
        }
        tasks
    }

    /// Stops every background loop and returns the link to idle.
    pub async fn shutdown(self) {
        info!("Shutting down...");
        self.shutdown.cancel();
        self.supervisor.reset().await;
        self.render.join();
    }
}
