//! Abstract interface for fetching governance engine configuration and engine actions
//! from the metadata store.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod action;
mod engine;

pub use action::{ActionStatus, ActionSummary};
pub use engine::{EngineDefinition, EngineStatus, RequestTypeBinding};

use std::error::Error;
use std::fmt::{self, Debug, Display};

use async_trait::async_trait;

/// The kind of configuration store error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigStoreErrorKind {
    /// The requested engine, action or binding does not exist.
    NotFound,

    /// The store could not be reached or did not answer in time.
    Unavailable,

    /// The store returned something that could not be interpreted.
    Malformed,

    /// The caller is not allowed to read or change the element.
    NotAuthorized,

    /// Other/unknown error
    Other,
}

impl Display for ConfigStoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for `ConfigurationStore` errors
pub trait ConfigStoreError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> ConfigStoreErrorKind;
}

/// Abstract interface for reading engine configuration and arbitrating engine actions.
///
/// `claim_action` must be atomic: when several hosts race for the same action,
/// exactly one caller observes `true`.
#[async_trait]
pub trait ConfigurationStore
where
    Self: Send + Sync + Clone + 'static,
{
    /// The error type for this store.
    type Error: ConfigStoreError;

    /// Get an engine definition by its qualified name.
    async fn get_engine_definition(&self, name: &str) -> Result<EngineDefinition, Self::Error>;

    /// Get an engine definition by its GUID.
    async fn get_engine_definition_by_guid(
        &self,
        guid: &str,
    ) -> Result<EngineDefinition, Self::Error>;

    /// Get the binding of `request_type` between an engine and one of its services.
    ///
    /// Returns `None` when the binding no longer exists.
    async fn get_request_type_binding(
        &self,
        engine_guid: &str,
        service_guid: &str,
        request_type: &str,
    ) -> Result<Option<RequestTypeBinding>, Self::Error>;

    /// Get an engine action by GUID.
    async fn get_action(&self, action_guid: &str) -> Result<ActionSummary, Self::Error>;

    /// Get the actions that the named engine may still need to run.
    async fn get_pending_actions_for_engine(
        &self,
        name: &str,
    ) -> Result<Vec<ActionSummary>, Self::Error>;

    /// Atomically assign an action to an engine; `true` when this caller won the claim.
    async fn claim_action(&self, action_guid: &str, engine_name: &str) -> Result<bool, Self::Error>;

    /// Record a new status for an action.
    async fn update_action_status(
        &self,
        action_guid: &str,
        status: ActionStatus,
    ) -> Result<(), Self::Error>;
}
