use crate::audit::AuditLog;
use crate::config::EngineHostConfig;
use crate::connector::OutTopicServerConnector;
use crate::coordinator::{ConfigurationRefreshCoordinator, CoordinatorState};
use crate::dispatcher::OutTopicEventDispatcher;
use crate::error::HostError;
use crate::handler::{EngineExecutor, EngineHandler, EngineSummary};
use crate::registry::EngineRegistry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use egeria_config_store::ConfigurationStore;
use egeria_event_bus::EventBusClient;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One engine host server: its engines, the out-topic listener, and the
/// background configuration refresh.
///
/// Each host owns its own registry and tasks, so several hosts can run in one
/// process.
pub struct EngineHost<S, C>
where
    S: ConfigurationStore,
    C: EventBusClient,
{
    config: EngineHostConfig,
    registry: Arc<EngineRegistry<S>>,
    dispatcher: OutTopicEventDispatcher<S>,
    coordinator: Arc<ConfigurationRefreshCoordinator<S, C>>,
    connector: OutTopicServerConnector<C>,
    task_tracker: TaskTracker,
    started: AtomicBool,
}

impl<S, C> EngineHost<S, C>
where
    S: ConfigurationStore,
    C: EventBusClient,
{
    /// Creates a host with one handler per configured engine, all sharing
    /// `executor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: EngineHostConfig,
        store: S,
        client: C,
        executor: Arc<dyn EngineExecutor>,
    ) -> Result<Self, HostError> {
        config.validate()?;

        let registry = Arc::new(EngineRegistry::new());
        for name in &config.engines {
            let handler = EngineHandler::new(
                name.clone(),
                store.clone(),
                Arc::clone(&executor),
                config.store_call_timeout,
            );
            registry.register(name.clone(), Arc::new(handler))?;
        }

        let dispatcher = OutTopicEventDispatcher::new(Arc::clone(&registry), config.scope.clone());
        let coordinator = Arc::new(ConfigurationRefreshCoordinator::new(
            config.server_name.clone(),
            config.user_id.clone(),
            client.clone(),
            Arc::clone(&registry),
            dispatcher.clone(),
            config.retry_delay,
            config.config_round_delay,
        ));
        let connector = OutTopicServerConnector::new(
            client,
            AuditLog::new(config.server_name.clone(), config.audit_capacity),
        );

        info!(
            server = %config.server_name,
            engines = config.engines.len(),
            topic = %config.out_topic,
            "Created engine host"
        );

        Ok(Self {
            config,
            registry,
            dispatcher,
            coordinator,
            connector,
            task_tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Starts the background configuration refresh and returns without waiting
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the host was already started or has been shut down.
    pub fn start(&self) -> Result<(), HostError> {
        if self.task_tracker.is_closed() {
            return Err(HostError::ShutDown(self.config.server_name.clone()));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyStarted(self.config.server_name.clone()));
        }

        info!(server = %self.config.server_name, "Starting engine host");
        self.coordinator.start(&self.task_tracker);
        Ok(())
    }

    /// Stops the refresh, waits for background tasks, and deregisters the
    /// out-topic listener.
    pub async fn shutdown(&self) {
        info!(server = %self.config.server_name, "Shutting down engine host");

        self.coordinator.stop();
        self.task_tracker.close();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task_tracker.wait()).await {
            Ok(()) => debug!(server = %self.config.server_name, "Background tasks completed"),
            Err(_) => warn!(server = %self.config.server_name, "Background tasks did not stop in time"),
        }

        self.coordinator.deregister();
    }

    /// Waits until every engine has its first configuration, or the host stops.
    pub async fn wait_until_configured(&self) -> CoordinatorState {
        self.coordinator.wait_for_steady_state().await
    }

    /// Server name.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    /// The host configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineHostConfig {
        &self.config
    }

    /// The engine registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<EngineRegistry<S>> {
        &self.registry
    }

    /// The handler for `engine`.
    #[must_use]
    pub fn handler(&self, engine: &str) -> Option<Arc<EngineHandler<S>>> {
        self.registry.lookup_by_name(engine)
    }

    /// The out-topic listener.
    #[must_use]
    pub const fn dispatcher(&self) -> &OutTopicEventDispatcher<S> {
        &self.dispatcher
    }

    /// The configuration refresh coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<ConfigurationRefreshCoordinator<S, C>> {
        &self.coordinator
    }

    /// The out-topic publisher.
    #[must_use]
    pub const fn connector(&self) -> &OutTopicServerConnector<C> {
        &self.connector
    }

    /// Audit records written by this host.
    #[must_use]
    pub const fn audit(&self) -> &AuditLog {
        self.connector.audit()
    }

    /// Status of every engine, ordered by name.
    #[must_use]
    pub fn engine_summaries(&self) -> Vec<EngineSummary> {
        self.registry.summaries()
    }
}
