use crate::audit::AuditLog;
use crate::error::ConnectorError;
use crate::event::OutTopicEvent;

use bytes::Bytes;
use egeria_event_bus::{EventBusClient, EventBusError};
use tracing::debug;

/// Publishes events to the out topic and audits each one sent.
///
/// Failed sends are returned to the caller and not retried.
#[derive(Clone, Debug)]
pub struct OutTopicServerConnector<C>
where
    C: EventBusClient,
{
    client: C,
    audit: AuditLog,
}

impl<C> OutTopicServerConnector<C>
where
    C: EventBusClient,
{
    /// Creates a connector publishing through `client`.
    pub const fn new(client: C, audit: AuditLog) -> Self {
        Self { client, audit }
    }

    /// The topic events are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.client.topic()
    }

    /// The audit log records are written to.
    #[must_use]
    pub const fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Serializes and publishes `event`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be encoded or the bus rejects it.
    pub async fn publish(&self, event: &OutTopicEvent) -> Result<(), ConnectorError> {
        let summary = event.summary();

        let payload = serde_json::to_vec(event).map_err(|source| ConnectorError::Serialize {
            summary: summary.clone(),
            source,
        })?;

        self.client
            .publish(Bytes::from(payload))
            .await
            .map_err(|e| ConnectorError::Send {
                summary: summary.clone(),
                kind: e.kind(),
                reason: e.to_string(),
            })?;

        debug!(topic = self.client.topic(), "Published {summary}");
        self.audit.record(event.audit_code(), &summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::audit::AuditCode;
    use crate::error::DispatchError;
    use crate::event::InboundEvent;

    use std::time::Duration;

    use async_trait::async_trait;
    use egeria_event_bus::{EventBusErrorKind, EventListener};
    use egeria_event_bus_memory::MemoryEventBus;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Clone)]
    struct ForwardingListener {
        sender: mpsc::UnboundedSender<Bytes>,
    }

    #[async_trait]
    impl EventListener for ForwardingListener {
        type Error = DispatchError;

        async fn on_event(&self, raw_payload: Bytes) -> Result<(), Self::Error> {
            let _ = self.sender.send(raw_payload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_and_audit() {
        let bus = MemoryEventBus::new();
        let client = bus.client("engine-host-1.out").unwrap();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let _registration = client
            .register_listener("observer", ForwardingListener { sender })
            .await
            .unwrap();

        let connector = OutTopicServerConnector::new(client, AuditLog::new("engine-host-1", 16));
        connector
            .publish(&OutTopicEvent::engine_action_created("a1"))
            .await
            .unwrap();

        let payload = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Channel closed");
        assert_eq!(
            InboundEvent::decode(&payload).unwrap(),
            InboundEvent::EngineActionCreated {
                guid: "a1".to_string()
            }
        );
        assert_eq!(connector.audit().count(AuditCode::NewEngineAction), 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_typed_and_not_audited() {
        let bus = MemoryEventBus::new();
        let client = bus.client("engine-host-1.out").unwrap();
        client.fail_publishes(1);

        let connector = OutTopicServerConnector::new(client, AuditLog::new("engine-host-1", 16));
        let err = connector
            .publish(&OutTopicEvent::engine_definition_changed("engine-guid-1"))
            .await
            .unwrap_err();

        match err {
            ConnectorError::Send { summary, kind, .. } => {
                assert_eq!(kind, EventBusErrorKind::Connector);
                assert!(summary.contains("engine-guid-1"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(connector.audit().is_empty());
    }
}
