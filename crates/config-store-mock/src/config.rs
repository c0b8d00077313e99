use egeria_config_store::{ActionSummary, EngineDefinition};
use serde::Deserialize;

/// Seed file contents
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub engines: Vec<EngineDefinition>,

    #[serde(default)]
    pub actions: Vec<ActionSummary>,
}
