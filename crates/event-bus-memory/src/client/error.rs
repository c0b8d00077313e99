use egeria_event_bus::{EventBusError, EventBusErrorKind};
use thiserror::Error;

/// An error that can occur when working with in-memory bus clients.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The topic name is invalid.
    #[error("invalid topic name - must not be empty or contain '*' or '>'")]
    InvalidTopic,

    /// A listener was registered without a user id.
    #[error("a listener must be registered with a non-empty user id")]
    EmptyUserId,

    /// The user may not register listeners on this topic.
    #[error("user {user_id} is not authorized to listen on topic {topic}")]
    NotAuthorized {
        /// The rejected user id.
        user_id: String,

        /// The topic the user tried to listen on.
        topic: String,
    },

    /// The connector failed.
    #[error("connector failure on topic {topic}: {reason}")]
    Connector {
        /// The topic being used.
        topic: String,

        /// What went wrong.
        reason: String,
    },
}

impl EventBusError for Error {
    fn kind(&self) -> EventBusErrorKind {
        match self {
            Self::InvalidTopic | Self::EmptyUserId => EventBusErrorKind::InvalidParameter,
            Self::NotAuthorized { .. } => EventBusErrorKind::NotAuthorized,
            Self::Connector { .. } => EventBusErrorKind::Connector,
        }
    }
}
