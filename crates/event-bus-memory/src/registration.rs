use egeria_event_bus::ListenerRegistration;
use tokio_util::sync::CancellationToken;

/// Registration handle for an in-memory listener.
#[derive(Clone, Debug)]
pub struct MemoryListenerRegistration {
    token: CancellationToken,
}

impl MemoryListenerRegistration {
    pub(crate) const fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl ListenerRegistration for MemoryListenerRegistration {
    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
