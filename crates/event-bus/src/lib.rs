//! Abstract interface for the publish/subscribe bus that carries out-topic events.
//!
//! Delivery is at-least-once. Events are ordered within a partition and
//! unordered across partitions, so listeners must tolerate redelivery.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Clients register listeners and publish events.
pub mod client;

/// Listeners receive raw event payloads.
pub mod listener;

pub use client::{EventBusClient, EventBusError, EventBusErrorKind, ListenerRegistration};
pub use listener::{EventListener, ListenerError};
