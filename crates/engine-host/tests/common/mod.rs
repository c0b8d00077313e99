#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use egeria_config_store::{ActionSummary, EngineDefinition, RequestTypeBinding};
use egeria_config_store_mock::MockConfigurationStore;
use egeria_engine_host::{
    DispatchReport, EngineExecutor, EngineHost, EngineHostConfig, ExecutorError, WatchdogCapable,
    WatchdogEvent,
};
use egeria_event_bus_memory::MemoryEventBusClient;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::timeout;

pub const TOPIC: &str = "egeria.omag.server.engine-host-1.out-topic";

/// Records what the host asks it to do.
#[derive(Default)]
pub struct RecordingExecutor {
    pub started: Mutex<Vec<(String, String)>>,
    pub watchdog_events: Mutex<Vec<(String, String)>>,
    pub failing_engines: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn started_actions(&self) -> Vec<String> {
        self.started
            .lock()
            .iter()
            .map(|(_, action)| action.clone())
            .collect()
    }
}

#[async_trait]
impl EngineExecutor for RecordingExecutor {
    async fn start_action(
        &self,
        engine: &EngineDefinition,
        action: &ActionSummary,
        _binding: &RequestTypeBinding,
    ) -> Result<(), ExecutorError> {
        self.started
            .lock()
            .push((engine.qualified_name.clone(), action.action_guid.clone()));
        Ok(())
    }

    fn watchdog(&self) -> Option<&dyn WatchdogCapable> {
        Some(self)
    }
}

#[async_trait]
impl WatchdogCapable for RecordingExecutor {
    async fn publish_watchdog_event(
        &self,
        engine: &EngineDefinition,
        event: &WatchdogEvent,
    ) -> Result<(), ExecutorError> {
        if self.failing_engines.lock().contains(&engine.qualified_name) {
            return Err(ExecutorError::new("watchdog service stopped"));
        }
        self.watchdog_events
            .lock()
            .push((engine.qualified_name.clone(), event.event_id.clone()));
        Ok(())
    }
}

pub fn engine(name: &str, guid: &str, request_types: &[&str]) -> EngineDefinition {
    request_types
        .iter()
        .enumerate()
        .fold(EngineDefinition::new(name, guid), |engine, (i, request_type)| {
            engine.with_binding(RequestTypeBinding::new(
                *request_type,
                format!("{guid}-service-{i}"),
            ))
        })
}

pub fn survey_engine() -> EngineDefinition {
    engine("survey-engine-1", "engine-guid-1", &["profile-resource"])
}

pub fn config(engines: &[&str]) -> EngineHostConfig {
    EngineHostConfig::new("engine-host-1", "host-npa", TOPIC, engines.iter().copied())
        .with_delays(Duration::from_secs(60), Duration::from_secs(60))
        .with_store_call_timeout(Duration::from_secs(5))
}

pub type TestHost = EngineHost<MockConfigurationStore, MemoryEventBusClient>;

pub fn host(
    config: EngineHostConfig,
    store: &MockConfigurationStore,
    client: &MemoryEventBusClient,
    executor: &Arc<RecordingExecutor>,
) -> TestHost {
    EngineHost::new(config, store.clone(), client.clone(), executor.clone()).unwrap()
}

pub async fn next_report(reports: &mut broadcast::Receiver<DispatchReport>) -> DispatchReport {
    timeout(Duration::from_secs(1), reports.recv())
        .await
        .expect("Timed out waiting for dispatch report")
        .expect("Report channel closed")
}
