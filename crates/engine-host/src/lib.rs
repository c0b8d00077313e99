//! Engine host core: keeps governance engines configured from the metadata
//! store and hands them the engine actions published on the out topic.
//!
//! An [`EngineHost`] owns one [`EngineHandler`] per configured engine, kept in
//! an [`EngineRegistry`]. At start-up a [`ConfigurationRefreshCoordinator`]
//! registers an [`OutTopicEventDispatcher`] on the event bus and pulls the
//! first configuration of every engine, retrying both under outage. From then
//! on the dispatcher routes configuration changes and new engine actions to
//! the handlers. An [`OutTopicServerConnector`] publishes events back to the
//! topic and audits each one.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod audit;
mod config;
mod connector;
mod coordinator;
mod dispatcher;
mod error;
mod event;
mod handler;
mod host;
mod registry;

pub use audit::{AUDIT_TARGET, AuditCode, AuditLog, AuditRecord};
pub use config::{
    DEFAULT_AUDIT_CAPACITY, DEFAULT_CONFIG_ROUND_DELAY, DEFAULT_RETRY_DELAY,
    DEFAULT_STORE_CALL_TIMEOUT, EngineHostConfig,
};
pub use connector::OutTopicServerConnector;
pub use coordinator::{ConfigurationRefreshCoordinator, CoordinatorState, CoordinatorStats};
pub use dispatcher::{DispatchReport, DispatchScope, OutTopicEventDispatcher};
pub use error::{
    ConfigError, ConfigFetchError, ConnectorError, DispatchError, ExecutionError, ExecutorError,
    HostError, RegistryError,
};
pub use event::{
    ENGINE_ACTION_CREATED_CLASS, ENGINE_DEFINITION_CHANGED_CLASS, ElementType, InboundEvent,
    OutTopicEvent, REQUEST_TYPE_PROPERTY, SERVICE_BINDING_CHANGED_CLASS, WATCHDOG_EVENT_CLASS,
    WatchdogEvent,
};
pub use handler::{ActionDisposition, EngineExecutor, EngineHandler, EngineSummary, WatchdogCapable};
pub use host::EngineHost;
pub use registry::EngineRegistry;
