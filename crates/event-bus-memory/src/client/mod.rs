mod error;

pub use error::Error;

use crate::registration::MemoryListenerRegistration;

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use egeria_event_bus::{EventBusClient, EventListener};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A failure to inject into the next listener registrations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegistrationFault {
    /// Reject the registration as unauthorized.
    NotAuthorized,

    /// Fail the registration as a connector outage.
    Connector,
}

#[derive(Default)]
struct Faults {
    registrations: Mutex<VecDeque<RegistrationFault>>,
    registration_latency: Mutex<Option<Duration>>,
    publishes: AtomicUsize,
    registration_attempts: AtomicUsize,
    published: AtomicUsize,
}

/// A client bound to one topic of a [`crate::MemoryEventBus`].
#[derive(Clone)]
pub struct MemoryEventBusClient {
    topic: String,
    sender: broadcast::Sender<Bytes>,
    faults: Arc<Faults>,
}

impl Debug for MemoryEventBusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEventBusClient")
            .field("topic", &self.topic)
            .field("listeners", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl MemoryEventBusClient {
    pub(crate) fn new(topic: String, sender: broadcast::Sender<Bytes>) -> Self {
        Self {
            topic,
            sender,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Makes the next `times` listener registrations fail with `fault`.
    pub fn fail_registrations(&self, fault: RegistrationFault, times: usize) {
        let mut queue = self.faults.registrations.lock();
        queue.extend(std::iter::repeat_n(fault, times));
    }

    /// Delays every listener registration by `latency`, or removes the delay.
    pub fn set_registration_latency(&self, latency: Option<Duration>) {
        *self.faults.registration_latency.lock() = latency;
    }

    /// Makes the next `times` publishes fail with a connector error.
    pub fn fail_publishes(&self, times: usize) {
        self.faults.publishes.fetch_add(times, Ordering::SeqCst);
    }

    /// Number of registration attempts made through this client, including failed ones.
    #[must_use]
    pub fn registration_attempts(&self) -> usize {
        self.faults.registration_attempts.load(Ordering::SeqCst)
    }

    /// Number of payloads successfully published through this client.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.faults.published.load(Ordering::SeqCst)
    }

    /// Number of listeners currently receiving from the topic.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn take_publish_fault(&self) -> bool {
        self.faults
            .publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventBusClient for MemoryEventBusClient {
    type Error = Error;
    type Registration = MemoryListenerRegistration;

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn register_listener<L>(
        &self,
        user_id: &str,
        listener: L,
    ) -> Result<MemoryListenerRegistration, Error>
    where
        L: EventListener,
    {
        self.faults
            .registration_attempts
            .fetch_add(1, Ordering::SeqCst);

        let latency = *self.faults.registration_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if user_id.is_empty() {
            return Err(Error::EmptyUserId);
        }

        let fault = self.faults.registrations.lock().pop_front();
        match fault {
            Some(RegistrationFault::NotAuthorized) => {
                return Err(Error::NotAuthorized {
                    user_id: user_id.to_string(),
                    topic: self.topic.clone(),
                });
            }
            Some(RegistrationFault::Connector) => {
                return Err(Error::Connector {
                    topic: self.topic.clone(),
                    reason: "listener registration refused".to_string(),
                });
            }
            None => {}
        }

        let mut receiver = self.sender.subscribe();
        let token = CancellationToken::new();
        let registration = MemoryListenerRegistration::new(token.clone());
        let topic = self.topic.clone();
        let user_id = user_id.to_string();

        debug!(%topic, %user_id, "registered listener");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        debug!(%topic, %user_id, "listener cancelled");
                        break;
                    }
                    message = receiver.recv() => match message {
                        Ok(payload) => {
                            if let Err(e) = listener.on_event(payload).await {
                                warn!(%topic, %user_id, "listener failed to handle event: {e}");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%topic, %user_id, skipped, "listener lagged behind the topic");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(registration)
    }

    async fn publish(&self, payload: Bytes) -> Result<(), Error> {
        if self.take_publish_fault() {
            return Err(Error::Connector {
                topic: self.topic.clone(),
                reason: "publish refused".to_string(),
            });
        }

        // No listeners is not a failure; the event is simply not observed.
        if self.sender.send(payload).is_err() {
            debug!(topic = %self.topic, "published event with no listeners");
        }
        self.faults.published.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
