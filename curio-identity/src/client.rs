//! HTTP clients for the identity services.
//!
//! Both services speak plain JSON over GET:
//!
//! - `GET {base}/username?address=A` → `{"username": "alice" | null}`
//! - `GET {base}/usernames?addresses=A,B` → `{"usernames": {...}, "rateLimited": bool}`
//! - `GET {base}/basename?address=A` → `{"name": "alice.base.eth" | null}`
//!
//! A 404 means "no name", a 429 means "come back later".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use curio_core::constants::REQUEST_TIMEOUT;
use curio_core::error::{CurioError, Result};
use curio_core::traits::{IdentityService, NameService};
use curio_core::types::BatchUsernames;

/// Identity client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityClientConfig {
    /// Service base URL, without a trailing slash
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl IdentityClientConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct UsernameResponse {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize)]
struct BasenameResponse {
    #[serde(default)]
    name: Option<String>,
}

/// Shared request plumbing for both services.
struct JsonGetter {
    config: IdentityClientConfig,
    http_client: reqwest::Client,
    service: &'static str,
}

impl JsonGetter {
    fn new(config: IdentityClientConfig, service: &'static str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CurioError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            service,
        })
    }

    /// Issues the GET. `Ok(None)` on 404.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let url = format!("{}/{}", self.config.base_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(CurioError::RateLimited(self.service.to_string()))
            }
            status if !status.is_success() => {
                return Err(CurioError::HttpError(format!(
                    "{} returned {}",
                    self.service, status
                )))
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| CurioError::MalformedResponse(format!("{}: {}", self.service, e)))
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> CurioError {
        if e.is_timeout() {
            CurioError::Timeout {
                target: url.to_string(),
                millis: self.config.timeout.as_millis() as u64,
            }
        } else {
            CurioError::HttpError(format!("{}: {}", self.service, e))
        }
    }
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Client for the primary username service.
pub struct HttpIdentityClient {
    inner: JsonGetter,
}

impl HttpIdentityClient {
    /// Creates a client with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(IdentityClientConfig::new(base_url))
    }

    /// Creates a client with custom configuration.
    pub fn with_config(config: IdentityClientConfig) -> Result<Self> {
        Ok(Self {
            inner: JsonGetter::new(config, "identity service")?,
        })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    #[instrument(skip(self))]
    async fn username_by_address(&self, address: &str) -> Result<Option<String>> {
        let response: Option<UsernameResponse> =
            self.inner.get("username", &[("address", address)]).await?;
        let username = non_empty(response.and_then(|r| r.username));
        debug!(address, found = username.is_some(), "Username lookup");
        Ok(username)
    }

    #[instrument(skip(self, addresses), fields(count = addresses.len()))]
    async fn usernames_by_addresses(&self, addresses: &[String]) -> Result<BatchUsernames> {
        let joined = addresses.join(",");
        let response: Option<BatchUsernames> = self
            .inner
            .get("usernames", &[("addresses", joined.as_str())])
            .await?;
        Ok(response.unwrap_or_default())
    }
}

/// Client for the secondary (basename) service.
pub struct BasenameClient {
    inner: JsonGetter,
}

impl BasenameClient {
    /// Creates a client with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(IdentityClientConfig::new(base_url))
    }

    /// Creates a client with custom configuration.
    pub fn with_config(config: IdentityClientConfig) -> Result<Self> {
        Ok(Self {
            inner: JsonGetter::new(config, "basename service")?,
        })
    }
}

#[async_trait]
impl NameService for BasenameClient {
    #[instrument(skip(self))]
    async fn name_by_address(&self, address: &str) -> Result<Option<String>> {
        let response: Option<BasenameResponse> =
            self.inner.get("basename", &[("address", address)]).await?;
        Ok(non_empty(response.and_then(|r| r.name)))
    }
}
