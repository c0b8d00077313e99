use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for listener errors
pub trait ListenerError: Debug + Error + Send + Sync + 'static {}

/// A trait representing a listener registered on an event bus topic.
#[async_trait]
pub trait EventListener
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for the listener.
    type Error: ListenerError;

    /// Handles one raw event payload, in the order the bus delivers it.
    async fn on_event(&self, raw_payload: Bytes) -> Result<(), Self::Error>;
}
