use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Lifecycle of an engine action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    /// Created, awaiting approval or a claiming engine.
    Requested,

    /// Approved and ready to be claimed.
    Approved,

    /// Waiting on a start time or a predecessor.
    Waiting,

    /// Claimed by an engine that is starting it.
    Activating,

    /// Running in an engine.
    InProgress,

    /// Completed successfully.
    Actioned,

    /// Rejected as invalid by the engine.
    Invalid,

    /// Ignored by the engine.
    Ignored,

    /// Failed while running.
    Failed,

    /// Cancelled before it finished.
    Cancelled,
}

impl ActionStatus {
    /// Whether an engine may claim an action in this status.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Requested | Self::Approved)
    }

    /// Whether an action in this status was claimed and has not yet finished.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Activating | Self::InProgress)
    }

    /// Whether the action has finished one way or another.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Actioned | Self::Invalid | Self::Ignored | Self::Failed | Self::Cancelled
        )
    }
}

impl Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The parts of an engine action the host needs to route and start it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    /// The GUID of the action.
    pub action_guid: String,

    /// The request type naming the work to do.
    pub request_type: String,

    /// Current status.
    pub status: ActionStatus,

    /// Qualified name of the engine that claimed the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_engine: Option<String>,

    /// Parameters supplied by the requester.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_parameters: BTreeMap<String, String>,

    /// GUIDs of the elements the action works on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_targets: Vec<String>,
}

impl ActionSummary {
    /// Creates an approved, unassigned action.
    #[must_use]
    pub fn new(action_guid: impl Into<String>, request_type: impl Into<String>) -> Self {
        Self {
            action_guid: action_guid.into(),
            request_type: request_type.into(),
            status: ActionStatus::Approved,
            assigned_engine: None,
            request_parameters: BTreeMap::new(),
            action_targets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(ActionStatus::Requested.is_claimable());
        assert!(ActionStatus::Approved.is_claimable());
        assert!(!ActionStatus::Waiting.is_claimable());
        assert!(!ActionStatus::InProgress.is_claimable());

        assert!(ActionStatus::Activating.is_active());
        assert!(ActionStatus::InProgress.is_active());
        assert!(!ActionStatus::Actioned.is_active());

        assert!(ActionStatus::Cancelled.is_terminal());
        assert!(!ActionStatus::Approved.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&ActionStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
