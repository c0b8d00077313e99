//! Error types for the engine host.

use std::time::Duration;

use egeria_config_store::{ConfigStoreError, ConfigStoreErrorKind};
use egeria_event_bus::EventBusErrorKind;
use thiserror::Error;

/// A failed or timed-out call to the configuration store.
#[derive(Clone, Debug)]
pub(crate) struct StoreFailure {
    pub kind: ConfigStoreErrorKind,
    pub reason: String,
}

impl StoreFailure {
    pub fn from_store<E: ConfigStoreError>(error: &E) -> Self {
        Self {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    pub fn timed_out(operation: &str, after: Duration) -> Self {
        Self {
            kind: ConfigStoreErrorKind::Unavailable,
            reason: format!("{operation} timed out after {after:?}"),
        }
    }
}

/// Errors raised while fetching engine configuration.
#[derive(Clone, Debug, Error)]
pub enum ConfigFetchError {
    /// The store could not be reached, refused the call, or did not answer in time.
    #[error("configuration store unavailable for engine {engine}: {reason}")]
    Unavailable {
        /// Engine being refreshed.
        engine: String,
        /// What the store reported.
        reason: String,
    },

    /// The store does not know the engine.
    #[error("engine {engine} not found in configuration store")]
    NotFound {
        /// Engine being refreshed.
        engine: String,
    },

    /// The store answered with something unusable.
    #[error("malformed configuration for engine {engine}: {reason}")]
    Malformed {
        /// Engine being refreshed.
        engine: String,
        /// Why the answer was rejected.
        reason: String,
    },

    /// The engine has not completed its first refresh.
    #[error("engine {engine} is not configured yet")]
    NotConfigured {
        /// Engine being refreshed.
        engine: String,
    },
}

impl ConfigFetchError {
    pub(crate) fn from_failure(engine: &str, failure: StoreFailure) -> Self {
        let engine = engine.to_string();
        match failure.kind {
            ConfigStoreErrorKind::NotFound => Self::NotFound { engine },
            ConfigStoreErrorKind::Malformed => Self::Malformed {
                engine,
                reason: failure.reason,
            },
            ConfigStoreErrorKind::Unavailable
            | ConfigStoreErrorKind::NotAuthorized
            | ConfigStoreErrorKind::Other => Self::Unavailable {
                engine,
                reason: failure.reason,
            },
        }
    }

    /// Whether retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Error returned by an [`EngineExecutor`](crate::EngineExecutor).
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct ExecutorError(String);

impl ExecutorError {
    /// Creates an executor error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Errors raised while claiming or running an engine action.
#[derive(Clone, Debug, Error)]
pub enum ExecutionError {
    /// A store call failed.
    #[error("store error for action {action_guid} on engine {engine} ({kind}): {reason}")]
    Store {
        /// Engine handling the action.
        engine: String,
        /// The action.
        action_guid: String,
        /// Kind of store failure.
        kind: ConfigStoreErrorKind,
        /// What the store reported.
        reason: String,
    },

    /// The executor could not start the action.
    #[error("executor failed action {action_guid} on engine {engine}: {source}")]
    Executor {
        /// Engine handling the action.
        engine: String,
        /// The action.
        action_guid: String,
        /// The executor's error.
        source: ExecutorError,
    },
}

impl ExecutionError {
    pub(crate) fn from_failure(engine: &str, action_guid: &str, failure: StoreFailure) -> Self {
        Self::Store {
            engine: engine.to_string(),
            action_guid: action_guid.to_string(),
            kind: failure.kind,
            reason: failure.reason,
        }
    }
}

/// Errors raised while publishing to the out topic.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The event could not be encoded.
    #[error("failed to serialize {summary}: {source}")]
    Serialize {
        /// Summary of the event.
        summary: String,
        /// Encoder error.
        source: serde_json::Error,
    },

    /// The bus rejected the event.
    #[error("failed to send {summary} ({kind}): {reason}")]
    Send {
        /// Summary of the event.
        summary: String,
        /// Kind of bus failure.
        kind: EventBusErrorKind,
        /// What the bus reported.
        reason: String,
    },
}

/// Errors raised while decoding inbound events.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload is not a JSON event envelope.
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// A field the event class needs is absent or empty.
    #[error("{class} event is missing {field}")]
    MissingField {
        /// The event class.
        class: String,
        /// The absent field.
        field: &'static str,
    },
}

/// Errors raised by the engine registry.
#[derive(Clone, Debug, Error)]
pub enum RegistryError {
    /// An engine with this qualified name is already registered.
    #[error("engine {0} is already registered")]
    DuplicateEngine(String),
}

/// Errors raised while loading host configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid configuration JSON.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration breaks a rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the engine host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An engine could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The host was already started.
    #[error("engine host {0} already started")]
    AlreadyStarted(String),

    /// The host was shut down and cannot be restarted.
    #[error("engine host {0} has been shut down")]
    ShutDown(String),
}
