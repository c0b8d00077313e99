//! Routes out-topic events to engine handlers.

use crate::error::DispatchError;
use crate::event::{InboundEvent, WatchdogEvent};
use crate::handler::{ActionDisposition, EngineHandler};
use crate::registry::EngineRegistry;

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use egeria_config_store::ConfigurationStore;
use egeria_event_bus::{EventListener, ListenerError};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const REPORT_CAPACITY: usize = 64;

impl ListenerError for DispatchError {}

/// Which engines a dispatcher routes events to.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchScope {
    /// Every engine of the server.
    #[default]
    Server,

    /// Only the named engine.
    Engine(String),
}

/// What happened to one inbound event.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DispatchReport {
    /// The event's GUID.
    pub event: String,
    /// Engines the event was handed to, in order.
    pub invoked: Vec<String>,
    /// Engine that claimed the action, for new engine actions.
    pub claimed_by: Option<String>,
    /// Engines whose handling failed.
    pub failed: Vec<String>,
}

impl DispatchReport {
    fn new(event: &InboundEvent) -> Self {
        Self {
            event: event.identity().to_string(),
            ..Self::default()
        }
    }

    /// Whether every invoked engine handled the event without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Listener that decodes out-topic events and hands them to engine handlers.
///
/// Events are handled one at a time, in delivery order. A failure in one
/// handler is logged and does not stop delivery to the others.
pub struct OutTopicEventDispatcher<S>
where
    S: ConfigurationStore,
{
    registry: Arc<EngineRegistry<S>>,
    scope: DispatchScope,
    reports: broadcast::Sender<DispatchReport>,
}

impl<S> Clone for OutTopicEventDispatcher<S>
where
    S: ConfigurationStore,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            scope: self.scope.clone(),
            reports: self.reports.clone(),
        }
    }
}

impl<S> Debug for OutTopicEventDispatcher<S>
where
    S: ConfigurationStore,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutTopicEventDispatcher")
            .field("scope", &self.scope)
            .field("engines", &self.registry.len())
            .finish()
    }
}

impl<S> OutTopicEventDispatcher<S>
where
    S: ConfigurationStore,
{
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<EngineRegistry<S>>, scope: DispatchScope) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            registry,
            scope,
            reports,
        }
    }

    /// The dispatcher's scope.
    #[must_use]
    pub const fn scope(&self) -> &DispatchScope {
        &self.scope
    }

    /// Receives a report for every event handled from now on.
    #[must_use]
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.reports.subscribe()
    }

    fn handlers_in_scope(&self) -> Vec<Arc<EngineHandler<S>>> {
        match &self.scope {
            DispatchScope::Server => self.registry.all_handlers(),
            DispatchScope::Engine(name) => self.registry.lookup_by_name(name).into_iter().collect(),
        }
    }

    /// Routes one decoded event.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchReport {
        let mut report = DispatchReport::new(&event);

        match &event {
            InboundEvent::EngineDefinitionChanged { guid } => {
                self.refresh_engines(guid, &mut report).await;
            }
            InboundEvent::EngineActionCreated { guid } => {
                self.offer_action(guid, &mut report).await;
            }
            InboundEvent::ServiceBindingChanged {
                engine_guid,
                service_guid,
                request_type,
            } => {
                self.refresh_binding(engine_guid, service_guid, request_type, &mut report)
                    .await;
            }
            InboundEvent::Watchdog(watchdog) => {
                self.forward_watchdog(watchdog, &mut report).await;
            }
            InboundEvent::Unrecognized { element_type } => {
                debug!(element_type, "Ignoring event for unrecognized element type");
            }
        }

        let _ = self.reports.send(report.clone());
        report
    }

    async fn refresh_engines(&self, guid: &str, report: &mut DispatchReport) {
        for handler in self.handlers_in_scope() {
            if handler.guid().is_some_and(|known| known != guid) {
                continue;
            }

            report.invoked.push(handler.name().to_string());
            if let Err(e) = handler.refresh_config(Some(guid)).await {
                warn!(engine = handler.name(), guid, "Engine definition refresh failed: {e}");
                report.failed.push(handler.name().to_string());
            }
        }
    }

    /// Every in-scope engine is offered the action, even after one claims it.
    /// The store decides the single winner.
    async fn offer_action(&self, action_guid: &str, report: &mut DispatchReport) {
        for handler in self.handlers_in_scope() {
            report.invoked.push(handler.name().to_string());

            match handler.execute_engine_action(action_guid).await {
                Ok(ActionDisposition::Claimed) => {
                    info!(engine = handler.name(), action_guid, "Engine action claimed");
                    report.claimed_by = Some(handler.name().to_string());
                }
                Ok(ActionDisposition::NotApplicable) => {}
                Err(e) => {
                    warn!(engine = handler.name(), action_guid, "Engine action failed: {e}");
                    report.failed.push(handler.name().to_string());
                }
            }
        }
    }

    async fn refresh_binding(
        &self,
        engine_guid: &str,
        service_guid: &str,
        request_type: &str,
        report: &mut DispatchReport,
    ) {
        for handler in self.handlers_in_scope() {
            if handler.guid().as_deref() != Some(engine_guid) {
                continue;
            }

            report.invoked.push(handler.name().to_string());
            if let Err(e) = handler
                .refresh_service_config(service_guid, engine_guid, request_type)
                .await
            {
                warn!(
                    engine = handler.name(),
                    service_guid,
                    request_type,
                    "Service binding refresh failed: {e}"
                );
                report.failed.push(handler.name().to_string());
            }
        }
    }

    async fn forward_watchdog(&self, event: &WatchdogEvent, report: &mut DispatchReport) {
        for handler in self.handlers_in_scope() {
            report.invoked.push(handler.name().to_string());
            if let Err(e) = handler.publish_watchdog_event(event).await {
                warn!(
                    engine = handler.name(),
                    event_id = %event.event_id,
                    "Watchdog event failed: {e}"
                );
                report.failed.push(handler.name().to_string());
            }
        }
    }
}

#[async_trait]
impl<S> EventListener for OutTopicEventDispatcher<S>
where
    S: ConfigurationStore,
{
    type Error = DispatchError;

    async fn on_event(&self, raw_payload: Bytes) -> Result<(), Self::Error> {
        match InboundEvent::decode(&raw_payload) {
            Ok(event) => {
                self.dispatch(event).await;
            }
            Err(e) => {
                warn!(bytes = raw_payload.len(), "Dropping undecodable out-topic event: {e}");
            }
        }
        Ok(())
    }
}
