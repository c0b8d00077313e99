//! Background registration of the out-topic listener and the initial
//! configuration pull.

use crate::dispatcher::OutTopicEventDispatcher;
use crate::registry::EngineRegistry;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use egeria_config_store::ConfigurationStore;
use egeria_event_bus::{EventBusClient, EventBusError, EventBusErrorKind, ListenerRegistration};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Progress of a coordinator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoordinatorState {
    /// Not started.
    Idle,

    /// Registering the out-topic listener.
    RegisteringListener {
        /// Attempt number, from 1.
        attempt: usize,
    },

    /// Fetching the configuration of engines that do not have it yet.
    PullingConfig {
        /// Engines still waiting for configuration.
        pending: BTreeSet<String>,
        /// Round number, from 1.
        round: usize,
    },

    /// Every engine is configured; changes now arrive as events.
    SteadyState,

    /// Stopped before or after reaching steady state.
    Stopped,
}

impl CoordinatorState {
    /// Whether the coordinator has nothing left to do.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::SteadyState | Self::Stopped)
    }
}

/// Counters kept by a coordinator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoordinatorStats {
    /// Listener registration attempts made.
    pub registration_attempts: usize,
    /// Configuration pull rounds started.
    pub config_rounds: usize,
    /// When the last registration attempt or pull round started.
    pub last_attempt: Option<Instant>,
}

/// Registers the dispatcher on the out topic and pulls the first configuration
/// of every engine, retrying both until they succeed or the coordinator is
/// stopped.
pub struct ConfigurationRefreshCoordinator<S, C>
where
    S: ConfigurationStore,
    C: EventBusClient,
{
    server_name: String,
    user_id: String,
    client: C,
    registry: Arc<EngineRegistry<S>>,
    dispatcher: OutTopicEventDispatcher<S>,
    retry_delay: Duration,
    config_round_delay: Duration,
    keep_trying: CancellationToken,
    state: watch::Sender<CoordinatorState>,
    stats: Mutex<CoordinatorStats>,
    registration: Mutex<Option<C::Registration>>,
}

impl<S, C> ConfigurationRefreshCoordinator<S, C>
where
    S: ConfigurationStore,
    C: EventBusClient,
{
    /// Creates an idle coordinator.
    pub fn new(
        server_name: impl Into<String>,
        user_id: impl Into<String>,
        client: C,
        registry: Arc<EngineRegistry<S>>,
        dispatcher: OutTopicEventDispatcher<S>,
        retry_delay: Duration,
        config_round_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Self {
            server_name: server_name.into(),
            user_id: user_id.into(),
            client,
            registry,
            dispatcher,
            retry_delay,
            config_round_delay,
            keep_trying: CancellationToken::new(),
            state,
            stats: Mutex::new(CoordinatorStats::default()),
            registration: Mutex::new(None),
        }
    }

    /// Spawns the coordinator on `tracker` and returns immediately.
    pub fn start(self: &Arc<Self>, tracker: &TaskTracker) {
        info!(server = %self.server_name, "Starting configuration refresh");

        let coordinator = Arc::clone(self);
        tracker.spawn(async move {
            coordinator.run().await;
        });
    }

    /// Stops retrying. A pending delay ends at once.
    pub fn stop(&self) {
        debug!(server = %self.server_name, "Stopping configuration refresh");
        self.keep_trying.cancel();
        self.state.send_replace(CoordinatorState::Stopped);
    }

    /// Cancels the listener registration, if there is one.
    pub fn deregister(&self) {
        if let Some(registration) = self.registration.lock().take() {
            registration.cancel();
            info!(server = %self.server_name, "Out-topic listener deregistered");
        }
    }

    /// Whether the listener is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registration
            .lock()
            .as_ref()
            .is_some_and(|registration| !registration.is_cancelled())
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    /// Receives every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Waits until the coordinator reaches steady state or is stopped.
    pub async fn wait_for_steady_state(&self) -> CoordinatorState {
        let mut receiver = self.state.subscribe();
        match receiver.wait_for(CoordinatorState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => CoordinatorState::Stopped,
        }
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        *self.stats.lock()
    }

    async fn run(&self) {
        if !self.register_listener().await || !self.pull_config().await {
            debug!(server = %self.server_name, "Configuration refresh stopped");
            return;
        }

        self.set_state(CoordinatorState::SteadyState);
        info!(server = %self.server_name, "All engines configured");
    }

    async fn register_listener(&self) -> bool {
        let mut attempt = 0;

        loop {
            if self.keep_trying.is_cancelled() {
                return false;
            }

            attempt += 1;
            self.set_state(CoordinatorState::RegisteringListener { attempt });
            {
                let mut stats = self.stats.lock();
                stats.registration_attempts = attempt;
                stats.last_attempt = Some(Instant::now());
            }

            match self
                .client
                .register_listener(&self.user_id, self.dispatcher.clone())
                .await
            {
                Ok(registration) => {
                    let mut slot = self.registration.lock();
                    // Stopped while the call was in progress; nobody will deregister it.
                    if self.keep_trying.is_cancelled() {
                        registration.cancel();
                        debug!(
                            server = %self.server_name,
                            attempt,
                            "Cancelled listener registered after stop"
                        );
                        return false;
                    }

                    info!(
                        server = %self.server_name,
                        topic = self.client.topic(),
                        attempt,
                        "Out-topic listener registered"
                    );
                    *slot = Some(registration);
                    return true;
                }
                Err(e) if e.kind() == EventBusErrorKind::NotAuthorized => {
                    warn!(
                        server = %self.server_name,
                        user_id = %self.user_id,
                        attempt,
                        "Not authorized to register out-topic listener, retrying in {:?}: {e}",
                        self.retry_delay
                    );
                }
                Err(e) => {
                    error!(
                        server = %self.server_name,
                        attempt,
                        "Failed to register out-topic listener, retrying in {:?}: {e}",
                        self.retry_delay
                    );
                }
            }

            if !self.pause(self.retry_delay).await {
                return false;
            }
        }
    }

    async fn pull_config(&self) -> bool {
        let mut pending: BTreeSet<String> = self.registry.names().into_iter().collect();
        let mut round = 0;

        while !pending.is_empty() {
            if self.keep_trying.is_cancelled() {
                return false;
            }

            round += 1;
            self.set_state(CoordinatorState::PullingConfig {
                pending: pending.clone(),
                round,
            });
            {
                let mut stats = self.stats.lock();
                stats.config_rounds = round;
                stats.last_attempt = Some(Instant::now());
            }

            for name in pending.clone() {
                let Some(handler) = self.registry.lookup_by_name(&name) else {
                    pending.remove(&name);
                    continue;
                };

                match handler.refresh_config(None).await {
                    Ok(()) => {
                        pending.remove(&name);
                        if let Err(e) = handler.restart_pending_actions().await {
                            warn!(engine = %name, "Could not restart pending actions: {e}");
                        }
                    }
                    Err(e) => {
                        warn!(engine = %name, round, "Engine configuration not yet available: {e}");
                    }
                }
            }

            if pending.is_empty() {
                break;
            }

            info!(
                server = %self.server_name,
                waiting = pending.len(),
                "Retrying engine configuration in {:?}",
                self.config_round_delay
            );
            if !self.pause(self.config_round_delay).await {
                return false;
            }
        }

        true
    }

    /// Moves to `next` unless already stopped.
    fn set_state(&self, next: CoordinatorState) {
        self.state.send_if_modified(|state| {
            if *state == CoordinatorState::Stopped {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Sleeps for `delay`; `false` if stopped first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.keep_trying.cancelled() => false,
        }
    }
}
