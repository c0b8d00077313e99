//! Per-engine state: cached configuration, status, and the in-flight action set.

use crate::error::{ConfigFetchError, ExecutionError, ExecutorError, StoreFailure};
use crate::event::WatchdogEvent;

use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use egeria_config_store::{
    ActionStatus, ActionSummary, ConfigStoreErrorKind, ConfigurationStore, EngineDefinition,
    EngineStatus, RequestTypeBinding,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Runs the actions an engine has claimed.
#[async_trait]
pub trait EngineExecutor: Send + Sync + 'static {
    /// Starts `action` on `engine` using the service named by `binding`.
    ///
    /// Returns once the action has been accepted. Completion is reported back
    /// through [`EngineHandler::complete_action`].
    async fn start_action(
        &self,
        engine: &EngineDefinition,
        action: &ActionSummary,
        binding: &RequestTypeBinding,
    ) -> Result<(), ExecutorError>;

    /// The watchdog capability, for executors whose engines watch catalog changes.
    fn watchdog(&self) -> Option<&dyn WatchdogCapable> {
        None
    }
}

/// Receives catalog changes on behalf of an engine.
#[async_trait]
pub trait WatchdogCapable: Send + Sync {
    /// Passes a watchdog event to the engine's listening services.
    async fn publish_watchdog_event(
        &self,
        engine: &EngineDefinition,
        event: &WatchdogEvent,
    ) -> Result<(), ExecutorError>;
}

/// Outcome of offering an action to an engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActionDisposition {
    /// This engine won the claim and started the action.
    Claimed,

    /// The action is not for this engine, or is already handled.
    NotApplicable,
}

/// Status report for one engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSummary {
    /// Qualified name of the engine.
    pub name: String,
    /// GUID, once known.
    pub guid: Option<String>,
    /// Current status.
    pub status: EngineStatus,
    /// Request types the engine accepts.
    pub request_types: Vec<String>,
    /// Number of actions running.
    pub in_flight: usize,
}

#[derive(Debug)]
struct HandlerState {
    definition: Option<EngineDefinition>,
    status: EngineStatus,
}

/// The host's view of one governance engine.
pub struct EngineHandler<S>
where
    S: ConfigurationStore,
{
    name: String,
    store: S,
    executor: Arc<dyn EngineExecutor>,
    store_call_timeout: Duration,
    state: RwLock<HandlerState>,
    in_flight: Mutex<HashSet<String>>,
}

impl<S> Debug for EngineHandler<S>
where
    S: ConfigurationStore,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandler")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl<S> EngineHandler<S>
where
    S: ConfigurationStore,
{
    /// Creates a handler for the engine named `name`. It has no configuration
    /// until [`refresh_config`](Self::refresh_config) succeeds.
    pub fn new(
        name: impl Into<String>,
        store: S,
        executor: Arc<dyn EngineExecutor>,
        store_call_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            executor,
            store_call_timeout,
            state: RwLock::new(HandlerState {
                definition: None,
                status: EngineStatus::Assigned,
            }),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Qualified name of the engine.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// GUID of the engine, known after the first successful refresh.
    #[must_use]
    pub fn guid(&self) -> Option<String> {
        self.state
            .read()
            .definition
            .as_ref()
            .map(|definition| definition.guid.clone())
    }

    /// Whether a configuration has been fetched.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.read().definition.is_some()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.state.read().status
    }

    /// The cached definition.
    #[must_use]
    pub fn definition(&self) -> Option<EngineDefinition> {
        self.state.read().definition.clone()
    }

    /// GUIDs of the actions claimed and not yet completed, sorted.
    #[must_use]
    pub fn in_flight_actions(&self) -> Vec<String> {
        let guids: BTreeSet<String> = self.in_flight.lock().iter().cloned().collect();
        guids.into_iter().collect()
    }

    /// Whether `action_guid` is claimed and not yet completed.
    #[must_use]
    pub fn is_in_flight(&self, action_guid: &str) -> bool {
        self.in_flight.lock().contains(action_guid)
    }

    /// Status report for this engine.
    #[must_use]
    pub fn summary(&self) -> EngineSummary {
        let state = self.state.read();
        EngineSummary {
            name: self.name.clone(),
            guid: state.definition.as_ref().map(|d| d.guid.clone()),
            status: state.status,
            request_types: state
                .definition
                .as_ref()
                .map(|d| {
                    d.accepted_request_types()
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            in_flight: self.in_flight.lock().len(),
        }
    }

    /// Fetches the engine definition and caches it.
    ///
    /// The definition is fetched by GUID when `guid_hint` is this engine's known
    /// GUID, and by qualified name otherwise. A transient failure leaves the
    /// cached definition untouched.
    ///
    /// # Errors
    ///
    /// Returns the classified store failure, or [`ConfigFetchError::Malformed`]
    /// if the store returned a definition for a different engine.
    pub async fn refresh_config(&self, guid_hint: Option<&str>) -> Result<(), ConfigFetchError> {
        let known_guid = {
            let mut state = self.state.write();
            if state.status == EngineStatus::Assigned {
                state.status = EngineStatus::Configuring;
            }
            state.definition.as_ref().map(|d| d.guid.clone())
        };

        let fetched = match (guid_hint, known_guid.as_deref()) {
            (Some(hint), Some(known)) if hint == known => {
                self.store_call(
                    "get_engine_definition_by_guid",
                    self.store.get_engine_definition_by_guid(hint),
                )
                .await
            }
            _ => {
                self.store_call(
                    "get_engine_definition",
                    self.store.get_engine_definition(&self.name),
                )
                .await
            }
        };

        let definition = match fetched {
            Ok(definition) => definition,
            Err(failure) => {
                let error = ConfigFetchError::from_failure(&self.name, failure);
                self.fail_if_unconfigured(&error);
                return Err(error);
            }
        };

        if definition.qualified_name != self.name || definition.guid.trim().is_empty() {
            let error = ConfigFetchError::Malformed {
                engine: self.name.clone(),
                reason: format!(
                    "store returned definition {} with GUID {:?}",
                    definition.qualified_name, definition.guid
                ),
            };
            self.fail_if_unconfigured(&error);
            return Err(error);
        }

        let status = if definition.disabled {
            EngineStatus::Disabled
        } else {
            EngineStatus::Running
        };

        info!(
            engine = %self.name,
            guid = %definition.guid,
            request_types = definition.request_types.len(),
            %status,
            "Engine configuration refreshed"
        );

        let mut state = self.state.write();
        state.definition = Some(definition);
        state.status = status;
        Ok(())
    }

    fn fail_if_unconfigured(&self, error: &ConfigFetchError) {
        warn!(engine = %self.name, "Failed to refresh engine configuration: {error}");

        if error.is_transient() {
            return;
        }
        let mut state = self.state.write();
        if state.definition.is_none() {
            state.status = EngineStatus::Failed;
        }
    }

    /// Refreshes one request type binding without refetching the whole engine.
    ///
    /// Events for other engines are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFetchError::NotConfigured`] before the first successful
    /// refresh, or the classified store failure.
    pub async fn refresh_service_config(
        &self,
        service_guid: &str,
        engine_guid: &str,
        request_type: &str,
    ) -> Result<(), ConfigFetchError> {
        let Some(own_guid) = self.guid() else {
            return Err(ConfigFetchError::NotConfigured {
                engine: self.name.clone(),
            });
        };
        if own_guid != engine_guid {
            debug!(engine = %self.name, engine_guid, "Ignoring binding change for another engine");
            return Ok(());
        }

        let binding = self
            .store_call(
                "get_request_type_binding",
                self.store
                    .get_request_type_binding(engine_guid, service_guid, request_type),
            )
            .await
            .map_err(|failure| ConfigFetchError::from_failure(&self.name, failure))?;

        let mut state = self.state.write();
        let Some(definition) = state.definition.as_mut() else {
            return Err(ConfigFetchError::NotConfigured {
                engine: self.name.clone(),
            });
        };

        if let Some(binding) = binding {
            info!(engine = %self.name, request_type, service_guid, "Request type binding updated");
            definition.upsert_binding(binding);
        } else if definition.remove_binding(service_guid, request_type) {
            info!(engine = %self.name, request_type, service_guid, "Request type binding removed");
        }

        Ok(())
    }

    /// Offers an action to this engine.
    ///
    /// The engine claims the action when it is configured and running, accepts
    /// the action's request type, and wins the claim in the store. A claimed
    /// action stays in flight until [`complete_action`](Self::complete_action).
    ///
    /// # Errors
    ///
    /// Returns an error if a store call fails or the executor rejects the
    /// action. The action is not left in flight in either case.
    pub async fn execute_engine_action(
        &self,
        action_guid: &str,
    ) -> Result<ActionDisposition, ExecutionError> {
        let Some(definition) = self.running_definition() else {
            debug!(engine = %self.name, action_guid, status = %self.status(), "Engine not running");
            return Ok(ActionDisposition::NotApplicable);
        };

        if !self.in_flight.lock().insert(action_guid.to_string()) {
            debug!(engine = %self.name, action_guid, "Action already in flight");
            return Ok(ActionDisposition::NotApplicable);
        }

        let result = self.claim_and_start(&definition, action_guid).await;
        if !matches!(result, Ok(ActionDisposition::Claimed)) {
            self.in_flight.lock().remove(action_guid);
        }
        result
    }

    async fn claim_and_start(
        &self,
        definition: &EngineDefinition,
        action_guid: &str,
    ) -> Result<ActionDisposition, ExecutionError> {
        let mut action = self
            .store_call("get_action", self.store.get_action(action_guid))
            .await
            .map_err(|failure| ExecutionError::from_failure(&self.name, action_guid, failure))?;

        let Some(binding) = definition.binding_for(&action.request_type).cloned() else {
            debug!(
                engine = %self.name,
                action_guid,
                request_type = %action.request_type,
                "Request type not supported"
            );
            return Ok(ActionDisposition::NotApplicable);
        };

        if action.assigned_engine.is_some() || !action.status.is_claimable() {
            debug!(engine = %self.name, action_guid, status = %action.status, "Action not claimable");
            return Ok(ActionDisposition::NotApplicable);
        }

        let claimed = self
            .store_call("claim_action", self.store.claim_action(action_guid, &self.name))
            .await
            .map_err(|failure| ExecutionError::from_failure(&self.name, action_guid, failure))?;

        if !claimed {
            debug!(engine = %self.name, action_guid, "Claim lost to another engine");
            return Ok(ActionDisposition::NotApplicable);
        }

        action.assigned_engine = Some(self.name.clone());
        action.status = ActionStatus::Activating;

        self.start(definition, &action, &binding).await?;

        info!(
            engine = %self.name,
            action_guid,
            request_type = %action.request_type,
            "Engine action claimed"
        );
        Ok(ActionDisposition::Claimed)
    }

    async fn start(
        &self,
        definition: &EngineDefinition,
        action: &ActionSummary,
        binding: &RequestTypeBinding,
    ) -> Result<(), ExecutionError> {
        if let Err(source) = self.executor.start_action(definition, action, binding).await {
            warn!(engine = %self.name, action_guid = %action.action_guid, "Executor failed to start action: {source}");

            if let Err(failure) = self
                .store_call(
                    "update_action_status",
                    self.store
                        .update_action_status(&action.action_guid, ActionStatus::Failed),
                )
                .await
            {
                warn!(
                    engine = %self.name,
                    action_guid = %action.action_guid,
                    "Could not mark action failed: {}",
                    failure.reason
                );
            }

            return Err(ExecutionError::Executor {
                engine: self.name.clone(),
                action_guid: action.action_guid.clone(),
                source,
            });
        }

        Ok(())
    }

    /// Starts the actions this engine may still need to run.
    ///
    /// Actions already assigned to this engine and still active are restarted.
    /// Unassigned actions go through the normal claim. Failures of individual
    /// actions are logged and skipped.
    ///
    /// Returns the number of actions started.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending action list cannot be fetched.
    pub async fn restart_pending_actions(&self) -> Result<usize, ConfigFetchError> {
        let Some(definition) = self.running_definition() else {
            return Ok(0);
        };

        let pending = self
            .store_call(
                "get_pending_actions_for_engine",
                self.store.get_pending_actions_for_engine(&self.name),
            )
            .await
            .map_err(|failure| ConfigFetchError::from_failure(&self.name, failure))?;

        let mut started = 0;
        for action in pending {
            let outcome = if action.assigned_engine.as_deref() == Some(self.name.as_str()) {
                self.resume(&definition, &action).await
            } else {
                self.execute_engine_action(&action.action_guid).await
            };

            match outcome {
                Ok(ActionDisposition::Claimed) => started += 1,
                Ok(ActionDisposition::NotApplicable) => {}
                Err(e) => warn!(engine = %self.name, action_guid = %action.action_guid, "Failed to restart action: {e}"),
            }
        }

        if started > 0 {
            info!(engine = %self.name, started, "Restarted pending engine actions");
        }
        Ok(started)
    }

    async fn resume(
        &self,
        definition: &EngineDefinition,
        action: &ActionSummary,
    ) -> Result<ActionDisposition, ExecutionError> {
        if !action.status.is_active() {
            return Ok(ActionDisposition::NotApplicable);
        }
        let Some(binding) = definition.binding_for(&action.request_type).cloned() else {
            warn!(
                engine = %self.name,
                action_guid = %action.action_guid,
                request_type = %action.request_type,
                "Assigned action has a request type the engine no longer supports"
            );
            return Ok(ActionDisposition::NotApplicable);
        };
        if !self.in_flight.lock().insert(action.action_guid.clone()) {
            return Ok(ActionDisposition::NotApplicable);
        }

        if let Err(e) = self.start(definition, action, &binding).await {
            self.in_flight.lock().remove(&action.action_guid);
            return Err(e);
        }
        Ok(ActionDisposition::Claimed)
    }

    /// Records that an action finished and releases it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not record the status. The action is
    /// released either way.
    pub async fn complete_action(
        &self,
        action_guid: &str,
        status: ActionStatus,
    ) -> Result<(), ExecutionError> {
        self.in_flight.lock().remove(action_guid);

        self.store_call(
            "update_action_status",
            self.store.update_action_status(action_guid, status),
        )
        .await
        .map_err(|failure| ExecutionError::from_failure(&self.name, action_guid, failure))?;

        info!(engine = %self.name, action_guid, %status, "Engine action completed");
        Ok(())
    }

    /// Passes a watchdog event to the executor when this engine is running and
    /// its executor watches catalog changes.
    ///
    /// # Errors
    ///
    /// Returns the executor's error.
    pub async fn publish_watchdog_event(&self, event: &WatchdogEvent) -> Result<(), ExecutorError> {
        let Some(definition) = self.running_definition() else {
            return Ok(());
        };
        let Some(watchdog) = self.executor.watchdog() else {
            return Ok(());
        };

        watchdog.publish_watchdog_event(&definition, event).await
    }

    fn running_definition(&self) -> Option<EngineDefinition> {
        let state = self.state.read();
        match state.status {
            EngineStatus::Running => state.definition.clone(),
            _ => None,
        }
    }

    async fn store_call<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreFailure>
    where
        F: Future<Output = Result<T, S::Error>> + Send,
    {
        match tokio::time::timeout(self.store_call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let failure = StoreFailure::from_store(&e);
                if failure.kind != ConfigStoreErrorKind::NotFound {
                    debug!(engine = %self.name, operation, kind = %failure.kind, "Store call failed: {e}");
                }
                Err(failure)
            }
            Err(_) => {
                warn!(engine = %self.name, operation, timeout = ?self.store_call_timeout, "Store call timed out");
                Err(StoreFailure::timed_out(operation, self.store_call_timeout))
            }
        }
    }
}
