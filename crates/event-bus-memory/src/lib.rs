//! In-memory implementation of the event bus crate.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Topic-bound clients.
pub mod client;

/// Listener registration handles.
pub mod registration;

pub use client::{Error, MemoryEventBusClient, RegistrationFault};
pub use registration::MemoryListenerRegistration;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Default number of undelivered events buffered per topic.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// An in-process broker. Each instance is independent, so several hosts can
/// share one bus in a test without touching process-global state.
#[derive(Clone, Debug)]
pub struct MemoryEventBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Bytes>>>>,
    capacity: usize,
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl MemoryEventBus {
    /// Creates a new bus with the default per-topic capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new bus buffering up to `capacity` events per topic.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Creates a client bound to `topic`, creating the topic if needed.
    ///
    /// # Errors
    /// Returns an error if the topic is empty or contains '*' or '>'
    pub fn client<K>(&self, topic: K) -> Result<MemoryEventBusClient, Error>
    where
        K: Into<String>,
    {
        let topic = topic.into();
        if topic.is_empty() || topic.contains('*') || topic.contains('>') {
            return Err(Error::InvalidTopic);
        }

        let sender = self
            .topics
            .lock()
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();

        Ok(MemoryEventBusClient::new(topic, sender))
    }

    /// Names of all topics created on this bus.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error as StdError;
    use std::fmt;

    use async_trait::async_trait;
    use egeria_event_bus::{
        EventBusClient, EventBusError, EventBusErrorKind, EventListener, ListenerError,
        ListenerRegistration,
    };
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};

    #[derive(Debug)]
    struct TestListenerError;

    impl fmt::Display for TestListenerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "TestListenerError")
        }
    }

    impl StdError for TestListenerError {}

    impl ListenerError for TestListenerError {}

    #[derive(Clone, Debug)]
    struct TestListener {
        sender: mpsc::Sender<Bytes>,
    }

    #[async_trait]
    impl EventListener for TestListener {
        type Error = TestListenerError;

        async fn on_event(&self, raw_payload: Bytes) -> Result<(), Self::Error> {
            self.sender
                .send(raw_payload)
                .await
                .map_err(|_| TestListenerError)
        }
    }

    fn setup_test_listener() -> (TestListener, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(10);
        (TestListener { sender }, receiver)
    }

    async fn next(receiver: &mut mpsc::Receiver<Bytes>) -> Bytes {
        timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_delivery_order() {
        let bus = MemoryEventBus::new();
        let client = bus.client("egeria.outTopic").unwrap();
        let (listener, mut receiver) = setup_test_listener();

        let _registration = client.register_listener("engine-host", listener).await.unwrap();

        client.publish(Bytes::from("event1")).await.unwrap();
        client.publish(Bytes::from("event2")).await.unwrap();
        client.publish(Bytes::from("event3")).await.unwrap();

        assert_eq!(next(&mut receiver).await, Bytes::from("event1"));
        assert_eq!(next(&mut receiver).await, Bytes::from("event2"));
        assert_eq!(next(&mut receiver).await, Bytes::from("event3"));
        assert_eq!(client.published_count(), 3);
    }

    #[tokio::test]
    async fn test_every_listener_receives() {
        let bus = MemoryEventBus::new();
        let publisher = bus.client("egeria.outTopic").unwrap();
        let subscriber = bus.client("egeria.outTopic").unwrap();

        let (first, mut first_receiver) = setup_test_listener();
        let (second, mut second_receiver) = setup_test_listener();
        let _a = subscriber.register_listener("host-a", first).await.unwrap();
        let _b = subscriber.register_listener("host-b", second).await.unwrap();
        assert_eq!(publisher.listener_count(), 2);

        publisher.publish(Bytes::from("event")).await.unwrap();

        assert_eq!(next(&mut first_receiver).await, Bytes::from("event"));
        assert_eq!(next(&mut second_receiver).await, Bytes::from("event"));
    }

    #[tokio::test]
    async fn test_cancelled_registration_stops_delivery() {
        let bus = MemoryEventBus::new();
        let client = bus.client("egeria.outTopic").unwrap();
        let (listener, mut receiver) = setup_test_listener();

        let registration = client.register_listener("engine-host", listener).await.unwrap();
        client.publish(Bytes::from("before")).await.unwrap();
        assert_eq!(next(&mut receiver).await, Bytes::from("before"));

        registration.cancel();
        assert!(registration.is_cancelled());

        // Once the delivery task exits the listener (and its sender) is dropped.
        assert!(
            timeout(Duration::from_secs(1), receiver.recv())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[derive(Clone, Debug)]
    struct PickyListener {
        sender: mpsc::Sender<Bytes>,
    }

    #[async_trait]
    impl EventListener for PickyListener {
        type Error = TestListenerError;

        async fn on_event(&self, raw_payload: Bytes) -> Result<(), Self::Error> {
            if raw_payload.as_ref() == b"bad" {
                return Err(TestListenerError);
            }
            self.sender
                .send(raw_payload)
                .await
                .map_err(|_| TestListenerError)
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_listener_error_does_not_stop_delivery() {
        let bus = MemoryEventBus::new();
        let client = bus.client("egeria.outTopic").unwrap();
        let (sender, mut receiver) = mpsc::channel(10);

        let _registration = client
            .register_listener("engine-host", PickyListener { sender })
            .await
            .unwrap();

        client.publish(Bytes::from("bad")).await.unwrap();
        client.publish(Bytes::from("good")).await.unwrap();

        assert_eq!(next(&mut receiver).await, Bytes::from("good"));
    }

    #[tokio::test]
    async fn test_injected_registration_faults() {
        let bus = MemoryEventBus::new();
        let client = bus.client("egeria.outTopic").unwrap();
        client.fail_registrations(RegistrationFault::NotAuthorized, 1);
        client.fail_registrations(RegistrationFault::Connector, 1);

        let (listener, _receiver) = setup_test_listener();

        let err = client
            .register_listener("engine-host", listener.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EventBusErrorKind::NotAuthorized);

        let err = client
            .register_listener("engine-host", listener.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EventBusErrorKind::Connector);

        assert!(client.register_listener("engine-host", listener).await.is_ok());
        assert_eq!(client.registration_attempts(), 3);
    }

    #[tokio::test]
    async fn test_empty_user_id_rejected() {
        let bus = MemoryEventBus::new();
        let client = bus.client("egeria.outTopic").unwrap();
        let (listener, _receiver) = setup_test_listener();

        let err = client.register_listener("", listener).await.unwrap_err();
        assert_eq!(err.kind(), EventBusErrorKind::InvalidParameter);
    }

    #[tokio::test]
    async fn test_injected_publish_fault() {
        let bus = MemoryEventBus::new();
        let client = bus.client("egeria.outTopic").unwrap();
        client.fail_publishes(1);

        let err = client.publish(Bytes::from("lost")).await.unwrap_err();
        assert_eq!(err.kind(), EventBusErrorKind::Connector);

        client.publish(Bytes::from("kept")).await.unwrap();
        assert_eq!(client.published_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let bus = MemoryEventBus::new();
        let client = bus.client("nobody.listens").unwrap();

        assert!(client.publish(Bytes::from("event")).await.is_ok());
    }

    #[test]
    fn test_invalid_topics() {
        let bus = MemoryEventBus::new();

        assert!(matches!(bus.client(""), Err(Error::InvalidTopic)));
        assert!(matches!(bus.client("topic.*"), Err(Error::InvalidTopic)));
        assert!(matches!(bus.client("topic.>"), Err(Error::InvalidTopic)));
        assert!(bus.topics().is_empty());
    }

    #[tokio::test]
    async fn test_buses_are_independent() {
        let first_bus = MemoryEventBus::new();
        let second_bus = MemoryEventBus::new();
        let first = first_bus.client("egeria.outTopic").unwrap();
        let second = second_bus.client("egeria.outTopic").unwrap();

        let (listener, mut receiver) = setup_test_listener();
        let _registration = second.register_listener("engine-host", listener).await.unwrap();

        first.publish(Bytes::from("elsewhere")).await.unwrap();
        second.publish(Bytes::from("here")).await.unwrap();

        assert_eq!(next(&mut receiver).await, Bytes::from("here"));
        assert_eq!(first_bus.topics(), vec!["egeria.outTopic".to_string()]);
    }
}
