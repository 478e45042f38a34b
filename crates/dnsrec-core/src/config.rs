//! Configuration types for the record synchronizer
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main synchronizer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Provider credentials and endpoint
    pub provider: ProviderConfig,

    /// Domains and the records tracked under each
    pub domains: Vec<DomainConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            domains: Vec::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Add a domain, returning it for record registration
    pub fn add_domain(&mut self, name: impl Into<String>) -> &mut DomainConfig {
        self.domains.push(DomainConfig::new(name));
        let last = self.domains.len() - 1;
        &mut self.domains[last]
    }

    /// Total number of configured records across all domains
    pub fn record_count(&self) -> usize {
        self.domains.iter().map(|d| d.records.len()).sum()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.record_count() == 0 {
            return Err(crate::Error::config("No records configured"));
        }

        self.provider.validate()?;
        self.engine.validate()?;

        for domain in &self.domains {
            domain.validate()?;
        }

        Ok(())
    }
}

/// Provider credentials
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key
    pub api_key: String,

    /// Secret API key
    pub secret_api_key: String,

    /// Override for the API base URL (tests, staging)
    #[serde(default)]
    pub base_url: Option<String>,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<REDACTED>")
            .field("secret_api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a provider configuration from a key pair
    pub fn new(api_key: impl Into<String>, secret_api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_api_key: secret_api_key.into(),
            base_url: None,
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_key.is_empty() {
            return Err(crate::Error::config("API key cannot be empty"));
        }
        if self.secret_api_key.is_empty() {
            return Err(crate::Error::config("Secret API key cannot be empty"));
        }
        Ok(())
    }
}

/// A domain and its tracked records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain name (e.g., "example.com")
    pub name: String,

    /// Records tracked under this domain
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

impl DomainConfig {
    /// Create an empty domain configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    /// Track a record under this domain
    pub fn add_record(
        &mut self,
        record_type: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut RecordConfig {
        self.records.push(RecordConfig::new(record_type, name));
        let last = self.records.len() - 1;
        &mut self.records[last]
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() {
            return Err(crate::Error::config("Domain name cannot be empty"));
        }

        for record in &self.records {
            if record.record_type.is_empty() {
                return Err(crate::Error::config(format!(
                    "Record type cannot be empty (domain {})",
                    self.name
                )));
            }
            if record.name.is_empty() {
                return Err(crate::Error::config(format!(
                    "Record name cannot be empty (domain {})",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

/// DNS record configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Record type (e.g., "A", "AAAA", "TXT")
    #[serde(rename = "type")]
    pub record_type: String,

    /// Record name relative to the domain (e.g., "www")
    pub name: String,

    /// Desired value, pushed through the entity proxy once it is available
    #[serde(default)]
    pub value: Option<String>,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(record_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            value: None,
        }
    }

    /// Set the desired value
    pub fn with_value(&mut self, value: impl Into<String>) -> &mut Self {
        self.value = Some(value.into());
        self
    }
}

/// Key under which a record is tracked: `{name}_{domain}.{type}`
pub fn record_key(domain: &str, record_type: &str, name: &str) -> String {
    format!("{}_{}.{}", name, domain, record_type)
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total attempts (first try included) before a request fails permanently
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before a failed attempt is re-enqueued (in milliseconds)
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Age below which a cached snapshot is trusted by the update path
    /// instead of re-fetching the record (in seconds)
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,

    /// Quiescence delay before the first refresh pass (in seconds)
    #[serde(default = "default_poll_initial_delay_secs")]
    pub poll_initial_delay_secs: u64,

    /// Interval between refresh passes (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Capacity of the channel feeding the worker
    ///
    /// The request queue holds everything else, so this stays small.
    #[serde(default = "default_worker_channel_capacity")]
    pub worker_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("max_attempts must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("poll_interval_secs must be > 0"));
        }
        if self.worker_channel_capacity == 0 {
            return Err(crate::Error::config("worker_channel_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_secs(self.poll_initial_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: 0,
            freshness_window_secs: default_freshness_window_secs(),
            poll_initial_delay_secs: default_poll_initial_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            worker_channel_capacity: default_worker_channel_capacity(),
        }
    }
}

fn default_max_attempts() -> u32 {
    crate::pipeline::DEFAULT_MAX_ATTEMPTS
}

fn default_freshness_window_secs() -> u64 {
    300
}

fn default_poll_initial_delay_secs() -> u64 {
    20
}

fn default_poll_interval_secs() -> u64 {
    4 * 60 * 60
}

fn default_worker_channel_capacity() -> usize {
    1
}
