//! Mock implementation of the configuration store interface for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;

use config::SeedFile;
pub use error::Error;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use egeria_config_store::{
    ActionStatus, ActionSummary, ConfigurationStore, EngineDefinition, RequestTypeBinding,
};
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    engines: HashMap<String, EngineDefinition>,
    actions: BTreeMap<String, ActionSummary>,
    failures_remaining: usize,
    failing_engines: HashSet<String>,
    latency: Option<Duration>,
    calls: Vec<String>,
}

impl State {
    fn engine_by_guid(&self, guid: &str) -> Option<&EngineDefinition> {
        self.engines.values().find(|engine| engine.guid == guid)
    }

    /// Records the call and consumes one injected outage, if any.
    fn record(&mut self, call: String) -> Result<(), Error> {
        self.calls.push(call.clone());
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(Error::Unavailable(call));
        }
        Ok(())
    }

    fn check_engine(&self, name: &str) -> Result<(), Error> {
        if self.failing_engines.contains(name) {
            return Err(Error::Unavailable(format!("engine {name}")));
        }
        Ok(())
    }
}

/// Mock implementation of the configuration store interface.
///
/// Claims are compare-and-set under a single lock, so concurrent claimers see
/// exactly one winner.
#[derive(Clone, Debug, Default)]
pub struct MockConfigurationStore {
    state: Arc<Mutex<State>>,
}

impl MockConfigurationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given engines and actions.
    #[must_use]
    pub fn with_contents(engines: Vec<EngineDefinition>, actions: Vec<ActionSummary>) -> Self {
        let store = Self::new();
        for engine in engines {
            store.insert_engine(engine);
        }
        for action in actions {
            store.insert_action(action);
        }
        store
    }

    /// Create a store from a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The seed file cannot be read
    /// - The seed file contains invalid JSON
    pub fn from_seed_file<P: AsRef<Path>>(seed_path: P) -> Result<Self, Error> {
        let mut file = File::open(seed_path)
            .map_err(|e| Error::SeedFile(format!("Failed to open seed file: {e}")))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::SeedFile(format!("Failed to read seed file: {e}")))?;

        let seed: SeedFile = serde_json::from_str(&content)
            .map_err(|e| Error::SeedFile(format!("Failed to parse seed file: {e}")))?;

        Ok(Self::with_contents(seed.engines, seed.actions))
    }

    /// Add or replace an engine definition.
    pub fn insert_engine(&self, engine: EngineDefinition) {
        self.state
            .lock()
            .engines
            .insert(engine.qualified_name.clone(), engine);
    }

    /// Remove an engine definition.
    pub fn remove_engine(&self, name: &str) -> Option<EngineDefinition> {
        self.state.lock().engines.remove(name)
    }

    /// Add or replace an engine action.
    pub fn insert_action(&self, action: ActionSummary) {
        self.state
            .lock()
            .actions
            .insert(action.action_guid.clone(), action);
    }

    /// Current copy of an engine action.
    #[must_use]
    pub fn action(&self, action_guid: &str) -> Option<ActionSummary> {
        self.state.lock().actions.get(action_guid).cloned()
    }

    /// Fail the next `times` calls, whatever they are, as unavailable.
    pub fn fail_next(&self, times: usize) {
        self.state.lock().failures_remaining += times;
    }

    /// Fail every call that concerns the named engine until it is restored.
    pub fn fail_engine(&self, name: impl Into<String>) {
        self.state.lock().failing_engines.insert(name.into());
    }

    /// Stop failing calls for the named engine.
    pub fn restore_engine(&self, name: &str) {
        self.state.lock().failing_engines.remove(name);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Total number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Every call made so far, as `operation:argument`.
    #[must_use]
    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ConfigurationStore for MockConfigurationStore {
    type Error = Error;

    async fn get_engine_definition(&self, name: &str) -> Result<EngineDefinition, Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!("get_engine_definition:{name}"))?;
        state.check_engine(name)?;

        state
            .engines
            .get(name)
            .cloned()
            .ok_or_else(|| Error::EngineNotFound(name.to_string()))
    }

    async fn get_engine_definition_by_guid(
        &self,
        guid: &str,
    ) -> Result<EngineDefinition, Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!("get_engine_definition_by_guid:{guid}"))?;

        let engine = state
            .engine_by_guid(guid)
            .cloned()
            .ok_or_else(|| Error::EngineNotFound(guid.to_string()))?;
        state.check_engine(&engine.qualified_name)?;

        Ok(engine)
    }

    async fn get_request_type_binding(
        &self,
        engine_guid: &str,
        service_guid: &str,
        request_type: &str,
    ) -> Result<Option<RequestTypeBinding>, Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!(
            "get_request_type_binding:{engine_guid}:{service_guid}:{request_type}"
        ))?;

        let engine = state
            .engine_by_guid(engine_guid)
            .ok_or_else(|| Error::EngineNotFound(engine_guid.to_string()))?;
        state.check_engine(&engine.qualified_name)?;

        Ok(engine
            .request_types
            .iter()
            .find(|binding| {
                binding.service_guid == service_guid && binding.request_type == request_type
            })
            .cloned())
    }

    async fn get_action(&self, action_guid: &str) -> Result<ActionSummary, Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!("get_action:{action_guid}"))?;

        state
            .actions
            .get(action_guid)
            .cloned()
            .ok_or_else(|| Error::ActionNotFound(action_guid.to_string()))
    }

    async fn get_pending_actions_for_engine(
        &self,
        name: &str,
    ) -> Result<Vec<ActionSummary>, Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!("get_pending_actions_for_engine:{name}"))?;
        state.check_engine(name)?;

        let engine = state
            .engines
            .get(name)
            .ok_or_else(|| Error::EngineNotFound(name.to_string()))?;
        let accepted = engine.accepted_request_types();

        Ok(state
            .actions
            .values()
            .filter(|action| match action.assigned_engine.as_deref() {
                Some(assigned) => assigned == name && action.status.is_active(),
                None => {
                    action.status.is_claimable()
                        && accepted.contains(action.request_type.as_str())
                }
            })
            .cloned()
            .collect())
    }

    async fn claim_action(&self, action_guid: &str, engine_name: &str) -> Result<bool, Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!("claim_action:{action_guid}:{engine_name}"))?;
        state.check_engine(engine_name)?;

        let action = state
            .actions
            .get_mut(action_guid)
            .ok_or_else(|| Error::ActionNotFound(action_guid.to_string()))?;

        if action.assigned_engine.is_some() || !action.status.is_claimable() {
            debug!(action_guid, engine_name, "claim lost");
            return Ok(false);
        }

        action.assigned_engine = Some(engine_name.to_string());
        action.status = ActionStatus::Activating;
        Ok(true)
    }

    async fn update_action_status(
        &self,
        action_guid: &str,
        status: ActionStatus,
    ) -> Result<(), Self::Error> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.record(format!("update_action_status:{action_guid}:{status}"))?;

        let action = state
            .actions
            .get_mut(action_guid)
            .ok_or_else(|| Error::ActionNotFound(action_guid.to_string()))?;
        action.status = status;
        Ok(())
    }
}
