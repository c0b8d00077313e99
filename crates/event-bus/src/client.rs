use crate::listener::EventListener;

use std::error::Error;
use std::fmt::{self, Debug, Display};

use async_trait::async_trait;
use bytes::Bytes;

/// The kind of event bus error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventBusErrorKind {
    /// The listener or user id was rejected as invalid.
    InvalidParameter,

    /// The user is not authorized to register with, or publish to, the bus.
    NotAuthorized,

    /// The underlying connector failed to deliver or accept the request.
    Connector,

    /// Other/unknown error
    Other,
}

impl Display for EventBusErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for event bus errors
pub trait EventBusError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> EventBusErrorKind;
}

/// Handle for a registered listener. Delivery stops once cancelled.
pub trait ListenerRegistration: Debug + Send + Sync + 'static {
    /// Stops delivery to the listener.
    fn cancel(&self);

    /// Whether delivery has been stopped.
    fn is_cancelled(&self) -> bool;
}

/// A client bound to one out-topic.
#[async_trait]
pub trait EventBusClient
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the client.
    type Error: EventBusError;

    /// The registration handle returned for each listener.
    type Registration: ListenerRegistration;

    /// The topic this client is bound to.
    fn topic(&self) -> &str;

    /// Registers a listener for events on the topic on behalf of `user_id`.
    async fn register_listener<L>(
        &self,
        user_id: &str,
        listener: L,
    ) -> Result<Self::Registration, Self::Error>
    where
        L: EventListener;

    /// Publishes a serialized event and waits until the send has completed or failed.
    async fn publish(&self, payload: Bytes) -> Result<(), Self::Error>;
}
