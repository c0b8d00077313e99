use crate::error::RegistryError;
use crate::handler::{EngineHandler, EngineSummary};

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use egeria_config_store::ConfigurationStore;

/// Handlers for the engines of one server, keyed by qualified name.
#[derive(Debug)]
pub struct EngineRegistry<S>
where
    S: ConfigurationStore,
{
    handlers: DashMap<String, Arc<EngineHandler<S>>>,
}

impl<S> Default for EngineRegistry<S>
where
    S: ConfigurationStore,
{
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl<S> EngineRegistry<S>
where
    S: ConfigurationStore,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateEngine`] if the name is taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<EngineHandler<S>>,
    ) -> Result<(), RegistryError> {
        match self.handlers.entry(name.into()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateEngine(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// The handler registered under `name`.
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<EngineHandler<S>>> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// The handler whose engine has `guid`. Engines that have not been
    /// configured yet are never found.
    #[must_use]
    pub fn lookup_by_guid(&self, guid: &str) -> Option<Arc<EngineHandler<S>>> {
        self.handlers
            .iter()
            .find(|entry| entry.value().guid().as_deref() == Some(guid))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// A snapshot of every handler, ordered by engine name.
    #[must_use]
    pub fn all_handlers(&self) -> Vec<Arc<EngineHandler<S>>> {
        let mut handlers: Vec<_> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handlers.sort_by(|a, b| a.name().cmp(b.name()));
        handlers
    }

    /// Registered engine names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Status reports for every engine, ordered by engine name.
    #[must_use]
    pub fn summaries(&self) -> Vec<EngineSummary> {
        self.all_handlers()
            .iter()
            .map(|handler| handler.summary())
            .collect()
    }

    /// Number of registered engines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no engines are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ExecutorError;
    use crate::handler::EngineExecutor;

    use std::time::Duration;

    use async_trait::async_trait;
    use egeria_config_store::{ActionSummary, EngineDefinition, RequestTypeBinding};
    use egeria_config_store_mock::MockConfigurationStore;

    struct NoopExecutor;

    #[async_trait]
    impl EngineExecutor for NoopExecutor {
        async fn start_action(
            &self,
            _engine: &EngineDefinition,
            _action: &ActionSummary,
            _binding: &RequestTypeBinding,
        ) -> Result<(), ExecutorError> {
            Ok(())
        }
    }

    fn handler(store: &MockConfigurationStore, name: &str) -> Arc<EngineHandler<MockConfigurationStore>> {
        Arc::new(EngineHandler::new(
            name,
            store.clone(),
            Arc::new(NoopExecutor),
            Duration::from_secs(1),
        ))
    }

    #[test]
    fn test_duplicate_rejected() {
        let store = MockConfigurationStore::new();
        let registry = EngineRegistry::new();

        registry
            .register("survey-engine-1", handler(&store, "survey-engine-1"))
            .unwrap();
        let err = registry
            .register("survey-engine-1", handler(&store, "survey-engine-1"))
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateEngine(name) if name == "survey-engine-1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let store = MockConfigurationStore::new();
        let registry = EngineRegistry::new();
        for name in ["zeta-engine", "alpha-engine", "mid-engine"] {
            registry.register(name, handler(&store, name)).unwrap();
        }

        let names: Vec<String> = registry
            .all_handlers()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, registry.names());
        assert_eq!(names[0], "alpha-engine");
        assert!(registry.lookup_by_name("unknown").is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_guid_after_refresh() {
        let store = MockConfigurationStore::with_contents(
            vec![EngineDefinition::new("survey-engine-1", "engine-guid-1")],
            vec![],
        );
        let registry = EngineRegistry::new();
        let survey = handler(&store, "survey-engine-1");
        registry.register("survey-engine-1", survey.clone()).unwrap();

        assert!(registry.lookup_by_guid("engine-guid-1").is_none());

        survey.refresh_config(None).await.unwrap();

        let found = registry.lookup_by_guid("engine-guid-1").unwrap();
        assert_eq!(found.name(), "survey-engine-1");
    }
}
