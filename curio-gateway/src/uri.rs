//! Metadata URI expansion.
//!
//! One logical resource may be reachable through several gateways. This
//! module turns a URI as found on the ledger into either an inline document
//! or an ordered list of candidate HTTP URLs.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use curio_core::constants::{ARWEAVE_GATEWAY, DEFAULT_IPFS_GATEWAYS, GATEWAY_TIMEOUT};
use curio_core::error::{CurioError, Result};

const DATA_JSON_BASE64: &str = "data:application/json;base64,";
const DATA_JSON_UTF8: &str = "data:application/json;utf8,";
const DATA_JSON: &str = "data:application/json,";

/// Gateway configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// IPFS gateway base URLs, tried in order
    pub ipfs_gateways: Vec<String>,
    /// Arweave gateway base URL
    pub arweave_gateway: String,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ipfs_gateways: DEFAULT_IPFS_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            arweave_gateway: ARWEAVE_GATEWAY.into(),
            timeout: GATEWAY_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Replaces the IPFS gateway list. Blank entries are ignored.
    pub fn with_ipfs_gateways<I, S>(mut self, gateways: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ipfs_gateways = gateways
            .into_iter()
            .map(|g| g.into().trim().trim_end_matches('/').to_string())
            .filter(|g| !g.is_empty())
            .collect();
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the primary IPFS gateway, if any.
    pub fn primary_gateway(&self) -> Option<&str> {
        self.ipfs_gateways.first().map(String::as_str)
    }
}

/// Where a resource can be obtained.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceLocation {
    /// The URI carried the document itself
    Inline(serde_json::Value),
    /// Candidate URLs, in the order they should be tried
    Remote(Vec<String>),
}

/// Expands a metadata URI into its candidate locations.
pub fn expand_uri(uri: &str, config: &GatewayConfig) -> Result<ResourceLocation> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(CurioError::ValidationError("empty metadata uri".into()));
    }

    if let Some(encoded) = uri.strip_prefix(DATA_JSON_BASE64) {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CurioError::MalformedResponse(format!("data uri: {}", e)))?;
        return parse_inline(&bytes);
    }
    if let Some(raw) = uri
        .strip_prefix(DATA_JSON_UTF8)
        .or_else(|| uri.strip_prefix(DATA_JSON))
    {
        return parse_inline(raw.as_bytes());
    }

    if let Some(path) = ipfs_path(uri) {
        validate_cid(path.split('/').next().unwrap_or_default())?;
        return Ok(ResourceLocation::Remote(gateway_urls(&path, config)));
    }

    if let Some(id) = uri.strip_prefix("ar://") {
        if id.is_empty() {
            return Err(CurioError::ValidationError("empty arweave id".into()));
        }
        let base = config.arweave_gateway.trim_end_matches('/');
        return Ok(ResourceLocation::Remote(vec![format!("{}/{}", base, id)]));
    }

    let url = Url::parse(uri)
        .map_err(|e| CurioError::ValidationError(format!("unsupported uri '{}': {}", uri, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CurioError::ValidationError(format!(
            "unsupported uri scheme: {}",
            url.scheme()
        )));
    }

    let mut urls = vec![uri.to_string()];
    if let Some(idx) = uri.find("/ipfs/") {
        let path = &uri[idx + "/ipfs/".len()..];
        if validate_cid(path.split(['/', '?', '#']).next().unwrap_or_default()).is_ok() {
            for candidate in gateway_urls(path, config) {
                if !urls.contains(&candidate) {
                    urls.push(candidate);
                }
            }
        }
    }
    Ok(ResourceLocation::Remote(urls))
}

/// Rewrites an image URI into a browser-loadable URL.
///
/// IPFS images go to the primary gateway, Arweave images to the Arweave
/// gateway; anything else is returned unchanged.
pub fn display_image_url(image: &str, config: &GatewayConfig) -> String {
    let image = image.trim();
    if let Some(path) = ipfs_path(image) {
        if let Some(gateway) = config.primary_gateway() {
            return format!("{}/ipfs/{}", gateway.trim_end_matches('/'), path);
        }
    }
    if let Some(id) = image.strip_prefix("ar://") {
        return format!("{}/{}", config.arweave_gateway.trim_end_matches('/'), id);
    }
    image.to_string()
}

/// Validates a content identifier.
pub fn validate_cid(cid: &str) -> Result<()> {
    if cid.is_empty() {
        return Err(CurioError::InvalidIpfsCid("CID cannot be empty".into()));
    }

    if cid.starts_with("Qm") {
        if cid.len() != 46 {
            return Err(CurioError::InvalidIpfsCid(format!(
                "Invalid CIDv0 length: expected 46, got {}",
                cid.len()
            )));
        }
    } else if cid.starts_with("bafy") || cid.starts_with("bafk") {
        if cid.len() < 50 {
            return Err(CurioError::InvalidIpfsCid(format!(
                "CIDv1 too short: {}",
                cid.len()
            )));
        }
    } else if !cid.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CurioError::InvalidIpfsCid(
            "CID contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Returns `CID[/path]` for `ipfs://` and `/ipfs/` URIs.
fn ipfs_path(uri: &str) -> Option<String> {
    let rest = uri
        .strip_prefix("ipfs://")
        .map(|r| r.strip_prefix("ipfs/").unwrap_or(r))
        .or_else(|| uri.strip_prefix("/ipfs/"))?;
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn gateway_urls(path: &str, config: &GatewayConfig) -> Vec<String> {
    config
        .ipfs_gateways
        .iter()
        .map(|g| format!("{}/ipfs/{}", g.trim_end_matches('/'), path))
        .collect()
}

fn parse_inline(bytes: &[u8]) -> Result<ResourceLocation> {
    serde_json::from_slice(bytes)
        .map(ResourceLocation::Inline)
        .map_err(|e| CurioError::MalformedResponse(format!("inline metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    fn config() -> GatewayConfig {
        GatewayConfig::default().with_ipfs_gateways(["https://gw1.test/", "https://gw2.test"])
    }

    fn remote(uri: &str) -> Vec<String> {
        match expand_uri(uri, &config()).unwrap() {
            ResourceLocation::Remote(urls) => urls,
            other => panic!("expected remote, got {:?}", other),
        }
    }

    #[test_case(&format!("ipfs://{}/1.json", CID) ; "scheme")]
    #[test_case(&format!("ipfs://ipfs/{}/1.json", CID) ; "doubled prefix")]
    #[test_case(&format!("/ipfs/{}/1.json", CID) ; "path")]
    fn test_ipfs_forms_expand_to_every_gateway(uri: &str) {
        assert_eq!(
            remote(uri),
            vec![
                format!("https://gw1.test/ipfs/{}/1.json", CID),
                format!("https://gw2.test/ipfs/{}/1.json", CID),
            ]
        );
    }

    #[test]
    fn test_gateway_url_keeps_original_first() {
        let original = format!("https://pinned.example/ipfs/{}/1.json", CID);
        let urls = remote(&original);
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], original);
        assert_eq!(urls[1], format!("https://gw1.test/ipfs/{}/1.json", CID));
    }

    #[test]
    fn test_gateway_url_not_duplicated() {
        let original = format!("https://gw1.test/ipfs/{}", CID);
        let urls = remote(&original);
        assert_eq!(urls, vec![original, format!("https://gw2.test/ipfs/{}", CID)]);
    }

    #[test]
    fn test_plain_https_and_arweave() {
        assert_eq!(
            remote("https://api.example/meta/1"),
            vec!["https://api.example/meta/1".to_string()]
        );
        assert_eq!(remote("ar://abc123"), vec!["https://arweave.net/abc123".to_string()]);
    }

    #[test]
    fn test_data_uris_decode_inline() {
        let doc = r#"{"name":"Inline"}"#;
        let b64 = format!("{}{}", DATA_JSON_BASE64, STANDARD.encode(doc));

        for uri in [b64, format!("{}{}", DATA_JSON, doc)] {
            match expand_uri(&uri, &config()).unwrap() {
                ResourceLocation::Inline(value) => assert_eq!(value["name"], "Inline"),
                other => panic!("expected inline, got {:?}", other),
            }
        }
    }

    #[test_case("" ; "empty")]
    #[test_case("ftp://example.com/x" ; "unsupported scheme")]
    #[test_case("ipfs://QmInvalid" ; "bad cid")]
    #[test_case("not a uri" ; "garbage")]
    #[test_case("data:application/json;base64,%%%" ; "bad base64")]
    fn test_rejected_uris(uri: &str) {
        assert!(expand_uri(uri, &config()).is_err());
    }

    #[test]
    fn test_display_image_url() {
        let cfg = config();
        assert_eq!(
            display_image_url(&format!("ipfs://{}", CID), &cfg),
            format!("https://gw1.test/ipfs/{}", CID)
        );
        assert_eq!(display_image_url("ar://img", &cfg), "https://arweave.net/img");
        assert_eq!(display_image_url("https://cdn/x.png", &cfg), "https://cdn/x.png");
    }

    #[test]
    fn test_validate_cid() {
        assert!(validate_cid(CID).is_ok());
        assert!(validate_cid("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi").is_ok());
        assert!(validate_cid("QmInvalid").is_err());
        assert!(validate_cid("").is_err());
        assert!(validate_cid("bad/cid").is_err());
    }
}
