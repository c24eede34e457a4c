//! Ordered multi-URL fetching.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, info, instrument};

use curio_core::constants::GATEWAY_TIMEOUT;
use curio_core::error::{CurioError, Result};

/// A successfully fetched structured document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    /// Parsed document
    pub payload: serde_json::Value,
    /// The URL that produced it
    pub used_url: String,
}

/// Fetches one logical resource from the first URL that serves it.
#[derive(Clone)]
pub struct GatewayFetcher {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl GatewayFetcher {
    /// Creates a fetcher with the default per-attempt timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(GATEWAY_TIMEOUT)
    }

    /// Creates a fetcher with a custom per-attempt timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| CurioError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Returns the per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Tries each URL in order and returns the first structured document.
    ///
    /// A non-success status, network error, timeout or unparseable body moves
    /// on to the next URL. If every URL fails, one
    /// [`CurioError::AllGatewaysFailed`] is returned.
    #[instrument(skip(self, urls), fields(candidates = urls.len()))]
    pub async fn resolve_resource(&self, urls: &[String]) -> Result<GatewayResponse> {
        let mut last_error = String::from("no candidate urls");

        for url in urls {
            match self.try_url(url).await {
                Ok(payload) => {
                    info!(url = %url, "Resource fetched");
                    return Ok(GatewayResponse {
                        payload,
                        used_url: url.clone(),
                    });
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Gateway attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(CurioError::AllGatewaysFailed {
            attempts: urls.len(),
            last_error,
        })
    }

    async fn try_url(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CurioError::HttpError(format!("{} returned {}", url, status)));
        }

        let declared_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if !declared_json && !looks_structured(&body) {
            return Err(CurioError::MalformedResponse(format!(
                "{} did not return a structured document",
                url
            )));
        }

        serde_json::from_slice(&body)
            .map_err(|e| CurioError::MalformedResponse(format!("{}: {}", url, e)))
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> CurioError {
        if e.is_timeout() {
            CurioError::Timeout {
                target: url.to_string(),
                millis: self.timeout.as_millis() as u64,
            }
        } else {
            CurioError::HttpError(format!("{}: {}", url, e))
        }
    }
}

/// True if the first non-whitespace byte opens an object or array.
fn looks_structured(body: &[u8]) -> bool {
    matches!(
        body.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'{') | Some(b'[')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_looks_structured() {
        assert!(looks_structured(b"  \n{\"a\":1}"));
        assert!(looks_structured(b"[1]"));
        assert!(!looks_structured(b"<html>"));
        assert!(!looks_structured(b""));
    }

    #[tokio::test]
    async fn test_fallback_order_stops_at_first_success() {
        let server = MockServer::start().await;
        Mock::given(path("/a"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello, not json"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Item"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Never"})))
            .expect(0)
            .mount(&server)
            .await;

        let urls: Vec<String> = ["a", "b", "c", "d"]
            .iter()
            .map(|p| format!("{}/{}", server.uri(), p))
            .collect();

        let fetcher = GatewayFetcher::new().unwrap();
        let response = fetcher.resolve_resource(&urls).await.unwrap();

        assert_eq!(response.used_url, urls[2]);
        assert_eq!(response.payload["name"], "Item");
    }

    #[tokio::test]
    async fn test_salvages_mislabelled_json() {
        let server = MockServer::start().await;
        Mock::given(path("/meta"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("\n  {\"name\": \"Salvaged\"}"),
            )
            .mount(&server)
            .await;

        let fetcher = GatewayFetcher::new().unwrap();
        let response = fetcher
            .resolve_resource(&[format!("{}/meta", server.uri())])
            .await
            .unwrap();
        assert_eq!(response.payload["name"], "Salvaged");
    }

    #[tokio::test]
    async fn test_declared_json_that_fails_to_parse_moves_on() {
        let server = MockServer::start().await;
        Mock::given(path("/broken"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("{\"name\": ", "application/json"),
            )
            .mount(&server)
            .await;
        Mock::given(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ok"})))
            .mount(&server)
            .await;

        let urls = vec![
            format!("{}/broken", server.uri()),
            format!("{}/ok", server.uri()),
        ];
        let response = GatewayFetcher::new()
            .unwrap()
            .resolve_resource(&urls)
            .await
            .unwrap();
        assert_eq!(response.used_url, urls[1]);
    }

    #[tokio::test]
    async fn test_timeout_only_aborts_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "Slow"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Fast"})))
            .mount(&server)
            .await;

        let urls = vec![
            format!("{}/slow", server.uri()),
            format!("{}/fast", server.uri()),
        ];
        let fetcher = GatewayFetcher::with_timeout(Duration::from_millis(50)).unwrap();
        let response = fetcher.resolve_resource(&urls).await.unwrap();
        assert_eq!(response.payload["name"], "Fast");
    }

    #[tokio::test]
    async fn test_all_failures_aggregate() {
        let server = MockServer::start().await;
        Mock::given(path("/x"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let urls = vec![format!("{}/x", server.uri()), format!("{}/x", server.uri())];
        let err = GatewayFetcher::new()
            .unwrap()
            .resolve_resource(&urls)
            .await
            .unwrap_err();

        match err {
            CurioError::AllGatewaysFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let empty = GatewayFetcher::new().unwrap().resolve_resource(&[]).await;
        assert!(matches!(
            empty,
            Err(CurioError::AllGatewaysFailed { attempts: 0, .. })
        ));
    }
}
