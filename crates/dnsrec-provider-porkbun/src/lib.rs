// # Porkbun DNS Provider
//
// This crate provides the Porkbun implementation of `DnsProvider` for the
// record synchronizer.
//
// ## Behavior
//
// - One HTTP request per trait call
// - HTTP timeout configured (30 seconds)
// - No retry, backoff, or caching: the request pipeline owns retries and the
//   worker decides whether a write is needed
// - No background tasks
//
// ## Error Mapping
//
// | Outcome                                | Result                          |
// |----------------------------------------|---------------------------------|
// | Connect/timeout/transport failure      | `Error::TransientNetwork`       |
// | HTTP 429 or 5xx                        | `Error::TransientNetwork`       |
// | Other HTTP status with a JSON envelope | `Ok(envelope)` (status checked  |
// |                                        | by the worker)                  |
// | Other HTTP status, unparsable body     | `Error::ProviderRejected`       |
// | 2xx with an unparsable body            | `Error::ProviderRejected`       |
//
// ## Security Requirements
//
// - API keys NEVER appear in logs or `Debug` output
// - Provider construction fails if either key is empty
//
// ## API Reference
//
// - Porkbun API v3: https://porkbun.com/api/json/v3/documentation
// - Retrieve: POST `/dns/retrieveByNameType/:domain/:type/:subdomain`
// - Edit: POST `/dns/edit/:domain/:id`
// - Every request body carries `{"apikey": ..., "secretapikey": ...}`

use async_trait::async_trait;
use dnsrec_core::config::ProviderConfig;
use dnsrec_core::traits::{DnsProvider, EditRecord, RetrieveResponse, StatusResponse};
use dnsrec_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Porkbun API base URL
pub const PORKBUN_API_BASE: &str = "https://api.porkbun.com/api/json/v3";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest body excerpt carried into an error message
const MAX_BODY_EXCERPT: usize = 200;

#[derive(Serialize)]
struct Credentials<'a> {
    apikey: &'a str,
    secretapikey: &'a str,
}

/// Request body: credentials plus, for edits, the record fields
#[derive(Serialize)]
struct RequestBody<'a> {
    #[serde(flatten)]
    credentials: Credentials<'a>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    record: Option<&'a EditRecord>,
}

/// Porkbun DNS provider
///
/// Stateless and single-shot. All coordination (retries, scheduling,
/// idempotency) is owned by the synchronizer core.
pub struct PorkbunProvider {
    /// ⚠️ NEVER log this value
    api_key: String,

    /// ⚠️ NEVER log this value
    secret_api_key: String,

    /// API base URL, without a trailing slash
    base_url: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the API keys
impl std::fmt::Debug for PorkbunProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PorkbunProvider")
            .field("api_key", &"<REDACTED>")
            .field("secret_api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PorkbunProvider {
    /// Create a provider talking to the public Porkbun API
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if either key is empty
    /// - [`Error::Other`] if the HTTP client cannot be built
    pub fn new(api_key: impl Into<String>, secret_api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, secret_api_key, PORKBUN_API_BASE)
    }

    /// Create a provider talking to `base_url` (staging, tests)
    pub fn with_base_url(
        api_key: impl Into<String>,
        secret_api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let secret_api_key = secret_api_key.into();

        if api_key.is_empty() {
            return Err(Error::config("Porkbun API key cannot be empty"));
        }
        if secret_api_key.is_empty() {
            return Err(Error::config("Porkbun secret API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            secret_api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a provider from the synchronizer's provider configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::with_base_url(
            config.api_key.clone(),
            config.secret_api_key.clone(),
            config.base_url.as_deref().unwrap_or(PORKBUN_API_BASE),
        )
    }

    fn retrieve_url(&self, domain: &str, record_type: &str, name: &str) -> String {
        format!(
            "{}/dns/retrieveByNameType/{}/{}/{}",
            self.base_url, domain, record_type, name
        )
    }

    fn edit_url(&self, domain: &str, record_id: &str) -> String {
        format!("{}/dns/edit/{}/{}", self.base_url, domain, record_id)
    }

    fn body<'a>(&'a self, record: Option<&'a EditRecord>) -> RequestBody<'a> {
        RequestBody {
            credentials: Credentials {
                apikey: &self.api_key,
                secretapikey: &self.secret_api_key,
            },
            record,
        }
    }

    /// POST `body` to `url` and decode the JSON envelope
    ///
    /// `operation` names the call in error messages; it never contains
    /// credentials.
    async fn post<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        body: &RequestBody<'_>,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: HTTP request failed: {}", operation, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::network(format!("{}: failed to read response: {}", operation, e)))?;

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Error::network(format!(
                "{}: Porkbun returned {} (transient): {}",
                operation,
                status,
                excerpt(&text)
            )));
        }

        match serde_json::from_str::<T>(&text) {
            Ok(envelope) => {
                if !status.is_success() {
                    tracing::debug!("{}: HTTP {} with a JSON envelope", operation, status);
                }
                Ok(envelope)
            }
            Err(e) if status.is_success() => Err(Error::provider_rejected(format!(
                "{}: failed to parse response: {}",
                operation, e
            ))),
            Err(_) => Err(Error::provider_rejected(format!(
                "{}: Porkbun returned {}: {}",
                operation,
                status,
                excerpt(&text)
            ))),
        }
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[async_trait]
impl DnsProvider for PorkbunProvider {
    async fn retrieve_by_name_type(
        &self,
        domain: &str,
        record_type: &str,
        name: &str,
    ) -> Result<RetrieveResponse> {
        tracing::debug!("Retrieving {} {} {}", domain, record_type, name);

        let url = self.retrieve_url(domain, record_type, name);
        let operation = format!("retrieve {} {} {}", domain, record_type, name);
        self.post(&operation, &url, &self.body(None)).await
    }

    async fn edit_record(
        &self,
        domain: &str,
        record_id: &str,
        record: &EditRecord,
    ) -> Result<StatusResponse> {
        tracing::debug!(
            "Editing {} record {} ({} {} -> \"{}\")",
            domain,
            record_id,
            record.record_type,
            record.name,
            record.content
        );

        let url = self.edit_url(domain, record_id);
        let operation = format!("edit {} record {}", domain, record_id);
        self.post(&operation, &url, &self.body(Some(record))).await
    }

    fn provider_name(&self) -> &'static str {
        "porkbun"
    }
}
