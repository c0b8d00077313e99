mod common;

use common::*;

use std::io::Write;
use std::sync::Arc;

use egeria_config_store_mock::MockConfigurationStore;
use egeria_engine_host::{
    AuditCode, ConfigError, CoordinatorState, EngineHost, EngineHostConfig, HostError,
    OutTopicEvent,
};
use egeria_event_bus_memory::MemoryEventBus;

#[tokio::test]
async fn test_start_twice_rejected() {
    let store = MockConfigurationStore::with_contents(vec![survey_engine()], vec![]);
    let bus = MemoryEventBus::new();
    let client = bus.client(TOPIC).unwrap();
    let executor = Arc::new(RecordingExecutor::default());
    let host = host(config(&["survey-engine-1"]), &store, &client, &executor);

    host.start().unwrap();
    assert!(matches!(host.start(), Err(HostError::AlreadyStarted(_))));

    host.shutdown().await;
    assert!(matches!(host.start(), Err(HostError::ShutDown(_))));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let store = MockConfigurationStore::new();
    let bus = MemoryEventBus::new();
    let client = bus.client(TOPIC).unwrap();
    let executor = Arc::new(RecordingExecutor::default());

    let result = EngineHost::new(
        config(&["survey-engine-1", "survey-engine-1"]),
        store,
        client,
        executor,
    );

    assert!(matches!(
        result,
        Err(HostError::Config(ConfigError::Invalid(_)))
    ));
}

#[tokio::test]
async fn test_shutdown_deregisters_listener() {
    let store = MockConfigurationStore::with_contents(vec![survey_engine()], vec![]);
    let bus = MemoryEventBus::new();
    let client = bus.client(TOPIC).unwrap();
    let executor = Arc::new(RecordingExecutor::default());
    let host = host(config(&["survey-engine-1"]), &store, &client, &executor);

    host.start().unwrap();
    host.wait_until_configured().await;
    assert!(host.coordinator().is_registered());

    host.shutdown().await;

    assert!(!host.coordinator().is_registered());
    assert_eq!(host.coordinator().state(), CoordinatorState::Stopped);
}

#[tokio::test]
async fn test_hosts_share_bus_without_sharing_state() {
    let store = MockConfigurationStore::with_contents(
        vec![
            survey_engine(),
            engine("survey-engine-2", "engine-guid-2", &["profile-resource"]),
        ],
        vec![],
    );
    let bus = MemoryEventBus::new();
    let executor = Arc::new(RecordingExecutor::default());

    let first = host(
        config(&["survey-engine-1"]),
        &store,
        &bus.client(TOPIC).unwrap(),
        &executor,
    );
    let mut second_config = config(&["survey-engine-2"]);
    second_config.server_name = "engine-host-2".to_string();
    let second = host(second_config, &store, &bus.client(TOPIC).unwrap(), &executor);

    first.start().unwrap();
    second.start().unwrap();
    first.wait_until_configured().await;
    second.wait_until_configured().await;
    let mut first_reports = first.dispatcher().subscribe_reports();
    let mut second_reports = second.dispatcher().subscribe_reports();

    store.insert_action(egeria_config_store::ActionSummary::new("a1", "profile-resource"));
    first
        .connector()
        .publish(&OutTopicEvent::engine_action_created("a1"))
        .await
        .unwrap();

    let first_report = next_report(&mut first_reports).await;
    let second_report = next_report(&mut second_reports).await;
    let claims: Vec<_> = [first_report.claimed_by, second_report.claimed_by]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(claims.len(), 1);
    assert_eq!(executor.started_actions(), vec!["a1"]);

    assert_eq!(first.registry().names(), vec!["survey-engine-1"]);
    assert_eq!(second.registry().names(), vec!["survey-engine-2"]);
    assert_eq!(first.audit().count(AuditCode::NewEngineAction), 1);
    assert!(second.audit().is_empty());

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_host_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "serverName": "engine-host-1",
            "userId": "host-npa",
            "outTopic": "{TOPIC}",
            "engines": ["survey-engine-1"],
            "configRoundDelay": {{ "secs": 1, "nanos": 0 }}
        }}"#
    )
    .unwrap();
    let config = EngineHostConfig::from_file(file.path()).unwrap();

    let store = MockConfigurationStore::with_contents(vec![survey_engine()], vec![]);
    let bus = MemoryEventBus::new();
    let client = bus.client(config.out_topic.clone()).unwrap();
    let executor = Arc::new(RecordingExecutor::default());
    let host = host(config, &store, &client, &executor);

    host.start().unwrap();
    assert_eq!(host.wait_until_configured().await, CoordinatorState::SteadyState);
    assert_eq!(host.server_name(), "engine-host-1");

    host.shutdown().await;
}
