use crate::dispatcher::DispatchScope;
use crate::error::ConfigError;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay between listener registration attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Default delay between configuration pull rounds.
pub const DEFAULT_CONFIG_ROUND_DELAY: Duration = Duration::from_secs(60);

/// Default bound on a single configuration store call.
pub const DEFAULT_STORE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of audit records retained in memory.
pub const DEFAULT_AUDIT_CAPACITY: usize = 256;

const fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

const fn default_config_round_delay() -> Duration {
    DEFAULT_CONFIG_ROUND_DELAY
}

const fn default_store_call_timeout() -> Duration {
    DEFAULT_STORE_CALL_TIMEOUT
}

const fn default_audit_capacity() -> usize {
    DEFAULT_AUDIT_CAPACITY
}

/// Configuration of one engine host server.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHostConfig {
    /// Name of the server hosting the engines.
    pub server_name: String,

    /// User id the host registers its listener and calls the store under.
    pub user_id: String,

    /// Topic carrying engine configuration and action events.
    pub out_topic: String,

    /// Qualified names of the engines this server runs.
    pub engines: Vec<String>,

    /// Which engines the out-topic listener routes to.
    #[serde(default)]
    pub scope: DispatchScope,

    /// Delay between listener registration attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// Delay between configuration pull rounds.
    #[serde(default = "default_config_round_delay")]
    pub config_round_delay: Duration,

    /// Bound on each configuration store call.
    #[serde(default = "default_store_call_timeout")]
    pub store_call_timeout: Duration,

    /// Number of audit records kept for inspection.
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

impl EngineHostConfig {
    /// Creates a configuration with default delays for the given engines.
    pub fn new<I, S>(
        server_name: impl Into<String>,
        user_id: impl Into<String>,
        out_topic: impl Into<String>,
        engines: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            server_name: server_name.into(),
            user_id: user_id.into(),
            out_topic: out_topic.into(),
            engines: engines.into_iter().map(Into::into).collect(),
            scope: DispatchScope::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            config_round_delay: DEFAULT_CONFIG_ROUND_DELAY,
            store_call_timeout: DEFAULT_STORE_CALL_TIMEOUT,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }

    /// Sets both retry delays.
    #[must_use]
    pub const fn with_delays(mut self, retry_delay: Duration, config_round_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self.config_round_delay = config_round_delay;
        self
    }

    /// Sets the per-call store timeout.
    #[must_use]
    pub const fn with_store_call_timeout(mut self, timeout: Duration) -> Self {
        self.store_call_timeout = timeout;
        self
    }

    /// Sets the dispatch scope.
    #[must_use]
    pub fn with_scope(mut self, scope: DispatchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file contains invalid JSON
    /// - The configuration fails validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the host cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::Invalid("server name is empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("user id is empty".to_string()));
        }
        if self.out_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("out topic is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for engine in &self.engines {
            if engine.trim().is_empty() {
                return Err(ConfigError::Invalid("engine name is empty".to_string()));
            }
            if !seen.insert(engine.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "engine {engine} is listed more than once"
                )));
            }
        }

        if let DispatchScope::Engine(name) = &self.scope {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "scoped engine {name} is not one of the configured engines"
                )));
            }
        }

        if self.retry_delay.is_zero() || self.config_round_delay.is_zero() {
            return Err(ConfigError::Invalid("retry delays must be non-zero".to_string()));
        }
        if self.store_call_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "store call timeout must be non-zero".to_string(),
            ));
        }
        if self.audit_capacity == 0 {
            return Err(ConfigError::Invalid("audit capacity must be non-zero".to_string()));
        }

        Ok(())
    }
}
