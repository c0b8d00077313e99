use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// How one request type is bound to a governance service of an engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTypeBinding {
    /// The request type the engine accepts.
    pub request_type: String,

    /// The GUID of the governance service that runs requests of this type.
    pub service_guid: String,

    /// The request type passed on to the service, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_request_type: Option<String>,

    /// Parameters merged into every request of this type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_parameters: BTreeMap<String, String>,
}

impl RequestTypeBinding {
    /// Creates a binding with no parameters.
    #[must_use]
    pub fn new(request_type: impl Into<String>, service_guid: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            service_guid: service_guid.into(),
            service_request_type: None,
            request_parameters: BTreeMap::new(),
        }
    }
}

/// A governance engine definition as held by the configuration store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDefinition {
    /// The unique qualified name of the engine.
    pub qualified_name: String,

    /// The GUID of the engine element.
    pub guid: String,

    /// A human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// A description of the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The kind of engine, for example `SurveyActionEngine`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_type: Option<String>,

    /// The request types the engine accepts.
    #[serde(default)]
    pub request_types: Vec<RequestTypeBinding>,

    /// Whether the engine has been disabled in the store.
    #[serde(default)]
    pub disabled: bool,
}

impl EngineDefinition {
    /// Creates an enabled definition with no request types.
    #[must_use]
    pub fn new(qualified_name: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            guid: guid.into(),
            display_name: None,
            description: None,
            engine_type: None,
            request_types: Vec::new(),
            disabled: false,
        }
    }

    /// Adds a request type binding.
    #[must_use]
    pub fn with_binding(mut self, binding: RequestTypeBinding) -> Self {
        self.request_types.push(binding);
        self
    }

    /// The set of request types this engine accepts.
    #[must_use]
    pub fn accepted_request_types(&self) -> BTreeSet<&str> {
        self.request_types
            .iter()
            .map(|binding| binding.request_type.as_str())
            .collect()
    }

    /// The binding for `request_type`, if the engine accepts it.
    #[must_use]
    pub fn binding_for(&self, request_type: &str) -> Option<&RequestTypeBinding> {
        self.request_types
            .iter()
            .find(|binding| binding.request_type == request_type)
    }

    /// Replaces the binding of `binding.request_type` for the same service, or adds it.
    pub fn upsert_binding(&mut self, binding: RequestTypeBinding) {
        match self.request_types.iter_mut().find(|existing| {
            existing.request_type == binding.request_type
                && existing.service_guid == binding.service_guid
        }) {
            Some(existing) => *existing = binding,
            None => self.request_types.push(binding),
        }
    }

    /// Removes the binding of `request_type` to `service_guid`. Returns whether one was removed.
    pub fn remove_binding(&mut self, service_guid: &str, request_type: &str) -> bool {
        let before = self.request_types.len();
        self.request_types.retain(|binding| {
            !(binding.request_type == request_type && binding.service_guid == service_guid)
        });
        before != self.request_types.len()
    }
}

/// The status of an engine as seen by the host running it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    /// Named in the server configuration; no configuration has been requested yet.
    Assigned,

    /// Waiting for the first configuration to arrive.
    Configuring,

    /// Configured and accepting actions.
    Running,

    /// The store does not know the engine or returned an unusable definition.
    Failed,

    /// The store has disabled the engine.
    Disabled,
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Assigned => "ASSIGNED",
            Self::Configuring => "CONFIGURING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Disabled => "DISABLED",
        };
        f.write_str(label)
    }
}
