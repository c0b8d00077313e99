//! Out-topic events: the JSON envelope carried on the bus and the closed set of
//! inbound events the host routes.

use crate::audit::AuditCode;
use crate::error::DispatchError;

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Class name of engine definition change events.
pub const ENGINE_DEFINITION_CHANGED_CLASS: &str = "EngineDefinitionChangedEvent";

/// Class name of new engine action events.
pub const ENGINE_ACTION_CREATED_CLASS: &str = "EngineActionCreatedEvent";

/// Class name of service binding change events.
pub const SERVICE_BINDING_CHANGED_CLASS: &str = "ServiceBindingChangedEvent";

/// Class name of watchdog events.
pub const WATCHDOG_EVENT_CLASS: &str = "WatchdogEvent";

/// Property carrying the request type of a service binding.
pub const REQUEST_TYPE_PROPERTY: &str = "requestType";

/// Element types the host routes on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ElementType {
    /// A governance engine definition.
    GovernanceEngine,

    /// A unit of work for an engine.
    EngineAction,

    /// The relationship binding a governance service to an engine.
    SupportedGovernanceService,
}

impl ElementType {
    /// The wire name of the element type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GovernanceEngine => "GovernanceEngine",
            Self::EngineAction => "EngineAction",
            Self::SupportedGovernanceService => "SupportedGovernanceService",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "GovernanceEngine" => Some(Self::GovernanceEngine),
            "EngineAction" => Some(Self::EngineAction),
            "SupportedGovernanceService" => Some(Self::SupportedGovernanceService),
            _ => None,
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata change passed on to engines that watch the catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchdogEvent {
    /// Identifier of the event on the bus.
    pub event_id: String,

    /// What happened, for example `NewElement`.
    pub event_kind: String,

    /// Type of the changed element.
    pub element_type: String,

    /// GUID of the changed element, when it has one.
    pub element_guid: Option<String>,

    /// Properties copied from the envelope.
    pub properties: BTreeMap<String, String>,
}

/// An inbound event after decoding and classification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InboundEvent {
    /// An engine definition changed.
    EngineDefinitionChanged {
        /// GUID of the engine.
        guid: String,
    },

    /// A new engine action was created.
    EngineActionCreated {
        /// GUID of the action.
        guid: String,
    },

    /// A governance service binding of an engine changed.
    ServiceBindingChanged {
        /// GUID of the engine (end one of the relationship).
        engine_guid: String,
        /// GUID of the service (end two of the relationship).
        service_guid: String,
        /// The request type the binding serves.
        request_type: String,
    },

    /// A change to pass to watching engines.
    Watchdog(WatchdogEvent),

    /// An event the host does not route.
    Unrecognized {
        /// The element type found in the envelope.
        element_type: String,
    },
}

impl InboundEvent {
    /// Decodes and classifies a raw payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an event envelope, or a field the
    /// event needs is missing.
    pub fn decode(payload: &[u8]) -> Result<Self, DispatchError> {
        let envelope: OutTopicEvent = serde_json::from_slice(payload)?;
        envelope.classify()
    }

    /// The event's GUID, for logging.
    #[must_use]
    pub fn identity(&self) -> &str {
        match self {
            Self::EngineDefinitionChanged { guid } | Self::EngineActionCreated { guid } => guid,
            Self::ServiceBindingChanged { service_guid, .. } => service_guid,
            Self::Watchdog(event) => &event.event_id,
            Self::Unrecognized { element_type } => element_type,
        }
    }
}

/// The JSON envelope of an out-topic event.
///
/// Fields the host does not know are kept in `extra` so that re-publishing an
/// event does not lose them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutTopicEvent {
    /// Event class name.
    pub class: String,

    /// Identifier of this event.
    #[serde(default)]
    pub event_id: String,

    /// Type of the element the event concerns.
    #[serde(default)]
    pub element_type: String,

    /// GUID of the element.
    #[serde(rename = "elementGUID", default, skip_serializing_if = "Option::is_none")]
    pub element_guid: Option<String>,

    /// GUID at end one, for relationship events.
    #[serde(rename = "endOneGUID", default, skip_serializing_if = "Option::is_none")]
    pub end_one_guid: Option<String>,

    /// GUID at end two, for relationship events.
    #[serde(rename = "endTwoGUID", default, skip_serializing_if = "Option::is_none")]
    pub end_two_guid: Option<String>,

    /// String properties of the element.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Kind of change, for watchdog events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<String>,

    /// Fields this host does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl OutTopicEvent {
    fn new(class: &str, element_type: &str) -> Self {
        Self {
            class: class.to_string(),
            event_id: Uuid::new_v4().to_string(),
            element_type: element_type.to_string(),
            element_guid: None,
            end_one_guid: None,
            end_two_guid: None,
            properties: BTreeMap::new(),
            event_kind: None,
            extra: BTreeMap::new(),
        }
    }

    /// An engine definition changed.
    #[must_use]
    pub fn engine_definition_changed(engine_guid: impl Into<String>) -> Self {
        let mut event = Self::new(
            ENGINE_DEFINITION_CHANGED_CLASS,
            ElementType::GovernanceEngine.as_str(),
        );
        event.element_guid = Some(engine_guid.into());
        event
    }

    /// A new engine action is ready to be claimed.
    #[must_use]
    pub fn engine_action_created(action_guid: impl Into<String>) -> Self {
        let mut event = Self::new(ENGINE_ACTION_CREATED_CLASS, ElementType::EngineAction.as_str());
        event.element_guid = Some(action_guid.into());
        event
    }

    /// The binding of `request_type` between an engine and a service changed.
    #[must_use]
    pub fn service_binding_changed(
        engine_guid: impl Into<String>,
        service_guid: impl Into<String>,
        request_type: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(
            SERVICE_BINDING_CHANGED_CLASS,
            ElementType::SupportedGovernanceService.as_str(),
        );
        event.end_one_guid = Some(engine_guid.into());
        event.end_two_guid = Some(service_guid.into());
        event
            .properties
            .insert(REQUEST_TYPE_PROPERTY.to_string(), request_type.into());
        event
    }

    /// A catalog change for watching engines.
    #[must_use]
    pub fn watchdog(
        event_kind: impl Into<String>,
        element_type: impl Into<String>,
        element_guid: Option<String>,
    ) -> Self {
        let element_type = element_type.into();
        let mut event = Self::new(WATCHDOG_EVENT_CLASS, &element_type);
        event.event_kind = Some(event_kind.into());
        event.element_guid = element_guid;
        event
    }

    /// Adds a string property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Classifies the envelope into the event the host routes.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingField`] when a field the event needs is
    /// absent or empty.
    pub fn classify(&self) -> Result<InboundEvent, DispatchError> {
        if self.class == WATCHDOG_EVENT_CLASS {
            return Ok(InboundEvent::Watchdog(WatchdogEvent {
                event_id: self.event_id.clone(),
                event_kind: self.event_kind.clone().unwrap_or_default(),
                element_type: self.element_type.clone(),
                element_guid: self.element_guid.clone(),
                properties: self.properties.clone(),
            }));
        }

        match ElementType::from_wire(&self.element_type) {
            Some(ElementType::GovernanceEngine) => Ok(InboundEvent::EngineDefinitionChanged {
                guid: self.required(self.element_guid.as_deref(), "elementGUID")?,
            }),
            Some(ElementType::EngineAction) => Ok(InboundEvent::EngineActionCreated {
                guid: self.required(self.element_guid.as_deref(), "elementGUID")?,
            }),
            Some(ElementType::SupportedGovernanceService) => {
                Ok(InboundEvent::ServiceBindingChanged {
                    engine_guid: self.required(self.end_one_guid.as_deref(), "endOneGUID")?,
                    service_guid: self.required(self.end_two_guid.as_deref(), "endTwoGUID")?,
                    request_type: self.required(
                        self.properties.get(REQUEST_TYPE_PROPERTY).map(String::as_str),
                        "properties.requestType",
                    )?,
                })
            }
            None => Ok(InboundEvent::Unrecognized {
                element_type: self.element_type.clone(),
            }),
        }
    }

    fn required(&self, value: Option<&str>, field: &'static str) -> Result<String, DispatchError> {
        match value {
            Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
            _ => Err(DispatchError::MissingField {
                class: self.class.clone(),
                field,
            }),
        }
    }

    /// The audit code recorded when this event is published.
    #[must_use]
    pub fn audit_code(&self) -> AuditCode {
        match self.classify() {
            Ok(InboundEvent::EngineDefinitionChanged { .. }) => AuditCode::EngineConfigurationChange,
            Ok(InboundEvent::EngineActionCreated { .. }) => AuditCode::NewEngineAction,
            Ok(InboundEvent::ServiceBindingChanged { .. }) => AuditCode::ServiceBindingChange,
            Ok(InboundEvent::Watchdog(_)) => AuditCode::WatchdogEvent,
            Ok(InboundEvent::Unrecognized { .. }) | Err(_) => AuditCode::OtherEvent,
        }
    }

    /// A one-line description for logs and errors.
    #[must_use]
    pub fn summary(&self) -> String {
        let subject = self
            .element_guid
            .as_deref()
            .or(self.end_one_guid.as_deref())
            .unwrap_or("-");
        format!(
            "{} {} {} (event {})",
            self.class, self.element_type, subject, self.event_id
        )
    }
}
