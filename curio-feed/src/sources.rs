//! Production collaborators: candidate list over HTTP, metadata from the ledger.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use curio_core::constants::REQUEST_TIMEOUT;
use curio_core::error::{CurioError, Result};
use curio_core::traits::{CandidateSource, LedgerReader, MetadataSource};
use curio_core::types::{ItemConfig, ItemMetadata};
use curio_gateway::MetadataClient;

/// Metadata resolved through the ledger's metadata URI and the gateways.
#[derive(Clone)]
pub struct LedgerMetadataSource {
    ledger: Arc<dyn LedgerReader>,
    client: MetadataClient,
}

impl LedgerMetadataSource {
    /// Creates a source.
    pub fn new(ledger: Arc<dyn LedgerReader>, client: MetadataClient) -> Self {
        Self { ledger, client }
    }
}

#[async_trait]
impl MetadataSource for LedgerMetadataSource {
    #[instrument(skip(self))]
    async fn fetch_item_metadata(&self, config: &ItemConfig) -> Result<ItemMetadata> {
        let uri = self
            .ledger
            .metadata_uri_of(&config.contract_ref, &config.item_id)
            .await?;
        debug!(uri = %uri, "Metadata URI");
        self.client.fetch_metadata(&uri).await
    }

    fn display_image_url(&self, image: &str) -> String {
        self.client.display_image_url(image)
    }
}

#[derive(Deserialize)]
struct CandidateList {
    #[serde(default)]
    items: Vec<ItemConfig>,
}

/// Candidate list served at `GET {base}/candidates` as `{"items": [...]}`.
#[derive(Clone)]
pub struct HttpCandidateSource {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpCandidateSource {
    /// Creates a source with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Creates a source with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CurioError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn candidate_list(&self) -> Result<Vec<ItemConfig>> {
        let url = format!("{}/candidates", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| CurioError::HttpError(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CurioError::HttpError(format!("{} returned {}", url, status)));
        }

        let list: CandidateList = response
            .json()
            .await
            .map_err(|e| CurioError::MalformedResponse(format!("candidate list: {}", e)))?;
        Ok(list.items)
    }
}

/// A fixed candidate list.
#[derive(Clone, Debug, Default)]
pub struct StaticCandidateSource {
    items: Vec<ItemConfig>,
}

impl StaticCandidateSource {
    /// Wraps a list.
    pub fn new(items: Vec<ItemConfig>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn candidate_list(&self) -> Result<Vec<ItemConfig>> {
        Ok(self.items.clone())
    }
}
