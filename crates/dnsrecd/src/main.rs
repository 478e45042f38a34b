// # dnsrecd - DNS Record Synchronizer Daemon
//
// This daemon is a THIN integration layer:
// - No DNS, retry, or scheduling logic lives here
// - All synchronization logic lives in dnsrec-core
// - Configuration is via environment variables ONLY
//
// The dnsrecd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the Porkbun provider and the entity registry
// 4. Starting the synchronizer (which pushes configured values) and
//    shutting it down on SIGTERM/SIGINT
//
// ## Configuration
//
// ### Provider
// - `DNSREC_API_KEY`: Porkbun API key (required)
// - `DNSREC_SECRET_API_KEY`: Porkbun secret API key (required)
// - `DNSREC_API_BASE_URL`: API base URL override (optional)
//
// ### Records
// - `DNSREC_RECORDS`: Comma-separated `domain/TYPE/name[=value]` entries
//
// ### Engine
// - `DNSREC_MAX_ATTEMPTS`: Attempts per request before giving up (default 11)
// - `DNSREC_RETRY_DELAY_MS`: Delay before a failed request is retried (default 0)
// - `DNSREC_FRESHNESS_WINDOW_SECS`: Age under which a cached value skips the
//   pre-update fetch (default 300)
// - `DNSREC_POLL_INTERVAL_SECS`: Interval between refresh passes (default 14400)
// - `DNSREC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DNSREC_API_KEY=pk1_...
// export DNSREC_SECRET_API_KEY=sk1_...
// export DNSREC_RECORDS=example.com/A/www=203.0.113.7,example.com/TXT/_acme
//
// dnsrecd
// ```

use anyhow::Result;
use dnsrec_core::config::{EngineConfig, ProviderConfig, SyncConfig};
use dnsrec_core::registry::EntityRegistry;
use dnsrec_core::SyncService;
use dnsrec_provider_porkbun::PorkbunProvider;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on the time the synchronizer gets to stop after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnsrecExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DnsrecExitCode> for ExitCode {
    fn from(code: DnsrecExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// One `domain/TYPE/name[=value]` entry of `DNSREC_RECORDS`
#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordSpec {
    domain: String,
    record_type: String,
    name: String,
    value: Option<String>,
}

impl RecordSpec {
    fn parse(entry: &str) -> Result<Self> {
        let (path, value) = match entry.split_once('=') {
            Some((path, value)) => (path.trim(), Some(value.trim().to_string())),
            None => (entry.trim(), None),
        };

        let parts: Vec<&str> = path.split('/').map(str::trim).collect();
        let [domain, record_type, name] = parts.as_slice() else {
            anyhow::bail!(
                "DNSREC_RECORDS entry '{}' must look like domain/TYPE/name[=value]",
                entry
            );
        };

        Ok(Self {
            domain: domain.to_lowercase(),
            record_type: record_type.to_uppercase(),
            name: name.to_string(),
            value: value.filter(|v| !v.is_empty()),
        })
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    api_key: String,
    secret_api_key: String,
    api_base_url: Option<String>,
    records: Vec<RecordSpec>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    freshness_window_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    log_level: String,
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: {}", key, raw))
        })
        .transpose()
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let records = lookup("DNSREC_RECORDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(RecordSpec::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            api_key: lookup("DNSREC_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("DNSREC_API_KEY is not set"))?,
            secret_api_key: lookup("DNSREC_SECRET_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("DNSREC_SECRET_API_KEY is not set"))?,
            api_base_url: lookup("DNSREC_API_BASE_URL").filter(|s| !s.is_empty()),
            records,
            max_attempts: parse_number("DNSREC_MAX_ATTEMPTS", lookup("DNSREC_MAX_ATTEMPTS"))?,
            retry_delay_ms: parse_number("DNSREC_RETRY_DELAY_MS", lookup("DNSREC_RETRY_DELAY_MS"))?,
            freshness_window_secs: parse_number(
                "DNSREC_FRESHNESS_WINDOW_SECS",
                lookup("DNSREC_FRESHNESS_WINDOW_SECS"),
            )?,
            poll_interval_secs: parse_number(
                "DNSREC_POLL_INTERVAL_SECS",
                lookup("DNSREC_POLL_INTERVAL_SECS"),
            )?,
            log_level: lookup("DNSREC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Covers required fields, placeholder credentials, record syntax,
    /// numeric ranges, and the log level.
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("DNSREC_API_KEY", &self.api_key),
            ("DNSREC_SECRET_API_KEY", &self.secret_api_key),
        ] {
            if value.is_empty() {
                anyhow::bail!("{} is required. Set it via: export {}=...", key, key);
            }

            // Check for obvious placeholder keys (common mistake)
            let lower = value.to_lowercase();
            if lower.contains("your_key") || lower.contains("replace_me") || lower == "key" {
                anyhow::bail!(
                    "{} appears to be a placeholder. \
                    Use the key pair from your Porkbun account.",
                    key
                );
            }
        }

        if let Some(ref url) = self.api_base_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("DNSREC_API_BASE_URL must use HTTP or HTTPS scheme. Got: {}", url);
        }

        if self.records.is_empty() {
            anyhow::bail!(
                "DNSREC_RECORDS must contain at least one record. \
                Set it via: export DNSREC_RECORDS=example.com/A/www"
            );
        }

        for record in &self.records {
            validate_domain_name(&record.domain)?;
            validate_record_type(&record.record_type)?;
            validate_record_name(&record.name)?;
        }

        if let Some(max_attempts) = self.max_attempts
            && (max_attempts == 0 || max_attempts > 100)
        {
            anyhow::bail!(
                "DNSREC_MAX_ATTEMPTS must be between 1 and 100. Got: {}",
                max_attempts
            );
        }

        if let Some(retry_delay) = self.retry_delay_ms
            && retry_delay > 60_000
        {
            anyhow::bail!(
                "DNSREC_RETRY_DELAY_MS must be at most 60000. Got: {}",
                retry_delay
            );
        }

        if let Some(interval) = self.poll_interval_secs
            && interval < 60
        {
            anyhow::bail!(
                "DNSREC_POLL_INTERVAL_SECS must be at least 60 seconds. Got: {}",
                interval
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DNSREC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the synchronizer configuration
    fn to_sync_config(&self) -> SyncConfig {
        let mut provider = ProviderConfig::new(self.api_key.clone(), self.secret_api_key.clone());
        provider.base_url = self.api_base_url.clone();

        let mut engine = EngineConfig::default();
        if let Some(max_attempts) = self.max_attempts {
            engine.max_attempts = max_attempts;
        }
        if let Some(retry_delay_ms) = self.retry_delay_ms {
            engine.retry_delay_ms = retry_delay_ms;
        }
        if let Some(window) = self.freshness_window_secs {
            engine.freshness_window_secs = window;
        }
        if let Some(interval) = self.poll_interval_secs {
            engine.poll_interval_secs = interval;
        }

        let mut config = SyncConfig::new(provider);
        config.engine = engine;

        for record in &self.records {
            let existing = config.domains.iter().position(|d| d.name == record.domain);
            let domain = match existing {
                Some(index) => &mut config.domains[index],
                None => config.add_domain(record.domain.clone()),
            };
            let configured = domain.add_record(record.record_type.clone(), record.name.clone());
            if let Some(ref value) = record.value {
                configured.with_value(value.clone());
            }
        }

        config
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; not comprehensive but catches common errors.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        validate_label(label, domain, false)?;
    }

    Ok(())
}

/// Record names are relative to the domain and may use `_` (`_acme-challenge`)
/// or a leading `*` wildcard label
fn validate_record_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Record name cannot be empty");
    }

    for (index, label) in name.split('.').enumerate() {
        if index == 0 && label == "*" {
            continue;
        }
        validate_label(label, name, true)?;
    }

    Ok(())
}

fn validate_label(label: &str, full: &str, allow_underscore: bool) -> Result<()> {
    if label.is_empty() {
        anyhow::bail!("Name has empty label: '{}'", full);
    }

    if label.len() > 63 {
        anyhow::bail!(
            "Label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        );
    }

    let valid = |c: char| c.is_ascii_alphanumeric() || c == '-' || (allow_underscore && c == '_');
    if !label.chars().all(valid) {
        anyhow::bail!(
            "Label contains invalid characters. Label: '{}'. \
            Valid: alphanumeric and hyphen only.",
            label
        );
    }

    if label.starts_with('-') || label.ends_with('-') {
        anyhow::bail!("Label cannot start or end with hyphen. Label: '{}'", label);
    }

    Ok(())
}

fn validate_record_type(record_type: &str) -> Result<()> {
    if record_type.is_empty() || !record_type.chars().all(|c| c.is_ascii_alphanumeric()) {
        anyhow::bail!(
            "Record type '{}' is not valid. Examples: A, AAAA, CNAME, TXT",
            record_type
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnsrecExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DnsrecExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsrecExitCode::ConfigError.into();
    }

    info!("Starting dnsrecd daemon");
    info!("Configuration loaded: {} record(s)", config.records.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsrecExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> DnsrecExitCode {
    let sync_config = config.to_sync_config();

    let provider = match PorkbunProvider::from_config(&sync_config.provider) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!("Failed to create Porkbun provider: {}", e);
            return DnsrecExitCode::ConfigError;
        }
    };
    let registry = Arc::new(EntityRegistry::new());

    let service = match SyncService::start(provider, registry.clone(), sync_config).await {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to start synchronizer: {}", e);
            return DnsrecExitCode::ConfigError;
        }
    };
    info!("Synchronizer started with {} registered record(s)", registry.len());

    let outcome = match wait_for_shutdown_signal().await {
        Ok(signal) => {
            info!("Received shutdown signal: {}", signal);
            DnsrecExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Signal handling error: {}", e);
            DnsrecExitCode::RuntimeError
        }
    };

    info!("Shutting down synchronizer");
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, service.shutdown()).await {
        Ok(Ok(())) => {
            info!("Synchronizer stopped");
            outcome
        }
        Ok(Err(e)) => {
            error!("Synchronizer shutdown failed: {}", e);
            DnsrecExitCode::RuntimeError
        }
        Err(_) => {
            error!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
            DnsrecExitCode::RuntimeError
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn base_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DNSREC_API_KEY", "pk1_0123456789abcdef"),
            ("DNSREC_SECRET_API_KEY", "sk1_0123456789abcdef"),
            ("DNSREC_RECORDS", "example.com/A/www=203.0.113.7, example.com/TXT/_acme-challenge"),
        ]
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DnsrecExitCode::CleanShutdown as u8, 0);
        assert_eq!(DnsrecExitCode::ConfigError as u8, 1);
        assert_eq!(DnsrecExitCode::RuntimeError as u8, 2);
    }

    #[test]
    fn test_record_spec_parse() {
        let spec = RecordSpec::parse("Example.com/a/www=1.2.3.4").unwrap();
        assert_eq!(spec.domain, "example.com");
        assert_eq!(spec.record_type, "A");
        assert_eq!(spec.name, "www");
        assert_eq!(spec.value.as_deref(), Some("1.2.3.4"));

        // Only the first '=' separates the value
        let spec = RecordSpec::parse("example.com/TXT/_dmarc=v=DMARC1").unwrap();
        assert_eq!(spec.value.as_deref(), Some("v=DMARC1"));

        assert_eq!(RecordSpec::parse("example.com/A/www=").unwrap().value, None);
        assert!(RecordSpec::parse("example.com/A").is_err());
        assert!(RecordSpec::parse("example.com/A/www/extra").is_err());
    }

    #[test]
    fn test_from_vars_and_validate() {
        let config = Config::from_vars(vars(&base_vars())).unwrap();
        assert_eq!(config.records.len(), 2);
        assert_eq!(config.log_level, "info");
        assert!(config.max_attempts.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let mut pairs = base_vars();
        pairs.retain(|(k, _)| *k != "DNSREC_SECRET_API_KEY");
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn test_unparsable_number_is_an_error() {
        let mut pairs = base_vars();
        pairs.push(("DNSREC_MAX_ATTEMPTS", "eleven"));
        let err = Config::from_vars(vars(&pairs)).unwrap_err();
        assert!(err.to_string().contains("DNSREC_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: &[(&'static str, &'static str)] = &[
            ("DNSREC_RECORDS", ""),
            ("DNSREC_RECORDS", "exa mple.com/A/www"),
            ("DNSREC_RECORDS", "example.com/A+/www"),
            ("DNSREC_RECORDS", "example.com/A/-www"),
            ("DNSREC_API_KEY", "replace_me"),
            ("DNSREC_API_BASE_URL", "ftp://api.example.test"),
            ("DNSREC_MAX_ATTEMPTS", "0"),
            ("DNSREC_RETRY_DELAY_MS", "120000"),
            ("DNSREC_POLL_INTERVAL_SECS", "5"),
            ("DNSREC_LOG_LEVEL", "verbose"),
        ];

        for &(key, value) in cases {
            let mut pairs = base_vars();
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
            let config = Config::from_vars(vars(&pairs)).unwrap();
            assert!(config.validate().is_err(), "{}={} should be rejected", key, value);
        }
    }

    #[test]
    fn test_wildcard_and_underscore_names() {
        assert!(validate_record_name("*.dev").is_ok());
        assert!(validate_record_name("_acme-challenge.www").is_ok());
        assert!(validate_record_name("www.*").is_err());
        assert!(validate_domain_name("under_score.com").is_err());
    }

    #[test]
    fn test_to_sync_config() {
        let pairs = [
            ("DNSREC_API_KEY", "pk1_0123456789abcdef"),
            ("DNSREC_SECRET_API_KEY", "sk1_0123456789abcdef"),
            ("DNSREC_RECORDS", "example.com/A/www=203.0.113.7,example.org/A/www,example.com/AAAA/www"),
            ("DNSREC_MAX_ATTEMPTS", "5"),
            ("DNSREC_API_BASE_URL", "http://localhost:8080"),
        ];

        let sync = Config::from_vars(vars(&pairs)).unwrap().to_sync_config();

        assert_eq!(sync.domains.len(), 2);
        assert_eq!(sync.domains[0].name, "example.com");
        assert_eq!(sync.domains[0].records.len(), 2);
        assert_eq!(sync.domains[0].records[0].value.as_deref(), Some("203.0.113.7"));
        assert_eq!(sync.domains[1].records[0].value, None);
        assert_eq!(sync.record_count(), 3);
        assert_eq!(sync.engine.max_attempts, 5);
        assert_eq!(sync.engine.poll_interval_secs, EngineConfig::default().poll_interval_secs);
        assert_eq!(sync.provider.base_url.as_deref(), Some("http://localhost:8080"));
        assert!(sync.validate().is_ok());
    }
}
