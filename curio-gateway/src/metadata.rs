//! Item metadata documents.

use tracing::{debug, instrument};

use curio_core::error::{CurioError, Result};
use curio_core::types::ItemMetadata;

use crate::gateway::{GatewayFetcher, GatewayResponse};
use crate::uri::{self, expand_uri, GatewayConfig, ResourceLocation};

/// Marker used as `used_url` for documents carried inline in the URI.
pub const INLINE_SOURCE: &str = "data:";

/// Fetches and parses metadata documents through the configured gateways.
#[derive(Clone)]
pub struct MetadataClient {
    config: GatewayConfig,
    fetcher: GatewayFetcher,
}

impl MetadataClient {
    /// Creates a client with default gateways.
    pub fn new() -> Result<Self> {
        Self::with_config(GatewayConfig::default())
    }

    /// Creates a client with custom configuration.
    pub fn with_config(config: GatewayConfig) -> Result<Self> {
        let fetcher = GatewayFetcher::with_timeout(config.timeout)?;
        Ok(Self { config, fetcher })
    }

    /// Returns the gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Fetches the raw document behind a metadata URI.
    #[instrument(skip(self))]
    pub async fn fetch_document(&self, uri: &str) -> Result<GatewayResponse> {
        match expand_uri(uri, &self.config)? {
            ResourceLocation::Inline(payload) => {
                debug!("Inline metadata");
                Ok(GatewayResponse {
                    payload,
                    used_url: INLINE_SOURCE.into(),
                })
            }
            ResourceLocation::Remote(urls) => self.fetcher.resolve_resource(&urls).await,
        }
    }

    /// Fetches and parses an item metadata document.
    ///
    /// A document that is not a JSON object, or whose fields have the wrong
    /// types, is a [`CurioError::MalformedResponse`].
    pub async fn fetch_metadata(&self, uri: &str) -> Result<ItemMetadata> {
        let response = self.fetch_document(uri).await?;
        parse_metadata(response.payload)
    }

    /// Rewrites an image URI into a browser-loadable URL.
    pub fn display_image_url(&self, image: &str) -> String {
        uri::display_image_url(image, &self.config)
    }
}

/// Parses a metadata payload.
pub fn parse_metadata(payload: serde_json::Value) -> Result<ItemMetadata> {
    if !payload.is_object() {
        return Err(CurioError::MalformedResponse(
            "metadata is not a JSON object".into(),
        ));
    }
    serde_json::from_value(payload)
        .map_err(|e| CurioError::MalformedResponse(format!("metadata fields: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    #[test]
    fn test_parse_metadata() {
        let meta = parse_metadata(json!({
            "name": "Sunrise",
            "description": "A print",
            "image": "ipfs://QmImage",
            "attributes": []
        }))
        .unwrap();
        assert_eq!(meta.name.as_deref(), Some("Sunrise"));
        assert_eq!(meta.image_uri(), Some("ipfs://QmImage"));
    }

    #[test]
    fn test_parse_metadata_rejects_non_objects() {
        assert!(parse_metadata(json!([1, 2])).unwrap_err().is_malformed());
        assert!(parse_metadata(json!("text")).unwrap_err().is_malformed());
        assert!(parse_metadata(json!({"name": 5})).unwrap_err().is_malformed());
    }

    #[tokio::test]
    async fn test_fetch_metadata_through_second_gateway() {
        let down = MockServer::start().await;
        Mock::given(path(format!("/ipfs/{}/1.json", CID)))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&down)
            .await;

        let up = MockServer::start().await;
        Mock::given(path(format!("/ipfs/{}/1.json", CID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Piece #1"})))
            .expect(1)
            .mount(&up)
            .await;

        let config = GatewayConfig::default().with_ipfs_gateways([down.uri(), up.uri()]);
        let client = MetadataClient::with_config(config).unwrap();

        let meta = client
            .fetch_metadata(&format!("ipfs://{}/1.json", CID))
            .await
            .unwrap();
        assert_eq!(meta.name.as_deref(), Some("Piece #1"));
    }

    #[tokio::test]
    async fn test_inline_document_needs_no_network() {
        let client = MetadataClient::with_config(GatewayConfig::default().with_ipfs_gateways(
            Vec::<String>::new(),
        ))
        .unwrap();

        let response = client
            .fetch_document(r#"data:application/json,{"name":"Inline"}"#)
            .await
            .unwrap();
        assert_eq!(response.used_url, INLINE_SOURCE);
        assert_eq!(response.payload["name"], "Inline");
    }

    #[test]
    fn test_display_image_url_uses_primary_gateway() {
        let client = MetadataClient::with_config(
            GatewayConfig::default().with_ipfs_gateways(["https://gw.test"]),
        )
        .unwrap();
        assert_eq!(
            client.display_image_url("ipfs://QmImage/a.png"),
            "https://gw.test/ipfs/QmImage/a.png"
        );
    }
}
