//! API route configuration.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Feed
        .route("/api/v1/feed", get(handlers::get_feed))
        .route("/api/v1/feed/more", post(handlers::load_more))
        .route("/api/v1/feed/retry", post(handlers::retry_failures))
        .route("/api/v1/feed/search", get(handlers::search_feed))
        .route("/api/v1/feed/artist", post(handlers::load_artist))

        // Identity & ledger
        .route("/api/v1/identity/batch", post(handlers::resolve_identity_batch))
        .route("/api/v1/identity/:address", get(handlers::resolve_identity))
        .route("/api/v1/owner/:contract", get(handlers::resolve_owner))

        // Access & sharing
        .route("/api/v1/allowlist/:address", get(handlers::check_allowlist))
        .route("/api/v1/share/:contract/:item", get(handlers::share_item))

        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use curio_cache::{DurableTier, MemoryStore};
    use curio_core::error::{CurioError, Result};
    use curio_core::traits::{Clock, IdentityService, KeyValueStore, LedgerReader, MetadataSource};
    use curio_core::types::{BatchUsernames, ItemConfig, ItemMetadata};
    use curio_core::ManualClock;
    use curio_feed::{FeedAggregator, FeedConfig, FeedServices, StaticCandidateSource};
    use curio_identity::{BatchIdentityResolver, IdentityResolver, IdentityResolverConfig};
    use curio_ledger::{ContractOwnerResolver, OwnerResolverConfig};

    use crate::state::{ApiConfig, StaticAllowlist};

    struct Names;

    #[async_trait]
    impl IdentityService for Names {
        async fn username_by_address(&self, address: &str) -> Result<Option<String>> {
            Ok((address == "0xartist").then(|| "alice".to_string()))
        }

        async fn usernames_by_addresses(&self, addresses: &[String]) -> Result<BatchUsernames> {
            Ok(BatchUsernames {
                usernames: addresses
                    .iter()
                    .map(|a| (a.clone(), (a == "0xartist").then(|| "alice".to_string())))
                    .collect(),
                rate_limited: false,
            })
        }
    }

    /// `0xc0ffee` is owned by `0xartist`; every other contract has no owner.
    struct Ledger;

    #[async_trait]
    impl LedgerReader for Ledger {
        async fn owner_of(&self, contract_ref: &str) -> Result<String> {
            if contract_ref == "0xc0ffee" {
                Ok("0xArtist".into())
            } else {
                Err(CurioError::NotFound(format!("owner of {}", contract_ref)))
            }
        }

        async fn metadata_uri_of(&self, _contract_ref: &str, _item_id: &str) -> Result<String> {
            Err(CurioError::InternalError("unused".into()))
        }
    }

    struct Metadata;

    #[async_trait]
    impl MetadataSource for Metadata {
        async fn fetch_item_metadata(&self, config: &ItemConfig) -> Result<ItemMetadata> {
            Ok(ItemMetadata {
                name: Some(format!("Study {}", config.item_id)),
                ..Default::default()
            })
        }
    }

    fn test_state() -> Arc<AppState> {
        let durable = DurableTier::new(Some(Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));

        let owners = ContractOwnerResolver::new(
            Arc::new(Ledger),
            OwnerResolverConfig::unpaced(),
            durable.clone(),
            Arc::clone(&clock),
        );
        let identities = BatchIdentityResolver::new(IdentityResolver::new(
            Arc::new(Names),
            None,
            IdentityResolverConfig::unthrottled(),
            durable.clone(),
            Arc::clone(&clock),
        ));
        let candidates = (1..=3).map(|i| ItemConfig::new("0xC0FFEE", i.to_string())).collect();
        let feed = FeedAggregator::new(
            FeedServices {
                candidates: Arc::new(StaticCandidateSource::new(candidates)),
                owners: owners.clone(),
                identities: identities.clone(),
                metadata: Arc::new(Metadata),
            },
            FeedConfig::unpaced(),
            durable,
            clock,
        );

        let config = ApiConfig {
            app_url: "https://curio.test".into(),
            ..ApiConfig::default()
        };
        Arc::new(AppState::new(
            config,
            Arc::new(feed),
            identities,
            owners,
            Arc::new(StaticAllowlist::new(["0xMember"])),
        ))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        call(create_router(Arc::clone(state)), "GET", uri, Body::empty()).await
    }

    async fn post(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
        call(
            create_router(Arc::clone(state)),
            "POST",
            uri,
            Body::from(body.to_string()),
        )
        .await
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = get(&test_state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_uptime_counts_from_startup() {
        let state = test_state();
        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

        let (_, body) = get(&state, "/health").await;
        assert!(body["uptime_seconds"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_feed_load_and_search() {
        let state = test_state();
        state.feed.hydrate().await;

        let (status, report) = post(&state, "/api/v1/feed/more", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["added"], 3);
        assert_eq!(report["hasMore"], false);

        let (_, snapshot) = get(&state, "/api/v1/feed").await;
        assert_eq!(snapshot["items"].as_array().unwrap().len(), 3);
        assert_eq!(snapshot["phase"], "exhausted");
        assert_eq!(snapshot["items"][0]["authorDisplayName"], "alice");

        let (_, found) = get(&state, "/api/v1/feed/search?q=study%202").await;
        assert_eq!(found["count"], 1);
        assert_eq!(found["items"][0]["itemId"], "2");
    }

    #[tokio::test]
    async fn test_retry_not_due() {
        let state = test_state();
        state.feed.hydrate().await;
        let (status, report) = post(&state, "/api/v1/feed/retry", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["skipped"], true);
    }

    #[tokio::test]
    async fn test_artist_requires_query() {
        let state = test_state();
        state.feed.hydrate().await;

        let (status, body) = post(&state, "/api/v1/feed/artist", Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, report) = post(&state, "/api/v1/feed/artist?q=alice", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["added"], 3);
        assert_eq!(report["cursor"], 0);
    }

    #[tokio::test]
    async fn test_identity_routes() {
        let state = test_state();

        let (status, body) = get(&state, "/api/v1/identity/0xARTIST").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "0xartist");
        assert_eq!(body["displayName"], "alice");

        let (status, body) = post(
            &state,
            "/api/v1/identity/batch",
            serde_json::json!({"addresses": ["0xartist", "0xnobody"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["names"]["0xartist"], "alice");
        assert_eq!(body["names"]["0xnobody"], "unknown");
    }

    #[tokio::test]
    async fn test_batch_too_large() {
        let addresses: Vec<String> = (0..1_001).map(|i| format!("0x{:x}", i)).collect();
        let (status, body) = post(
            &test_state(),
            "/api/v1/identity/batch",
            serde_json::json!({ "addresses": addresses }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_owner_route() {
        let state = test_state();

        let (status, body) = get(&state, "/api/v1/owner/0xC0FFEE").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["owner"], "0xartist");

        let (status, body) = get(&state, "/api/v1/owner/0xdead").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn test_allowlist_route() {
        let state = test_state();

        let (_, body) = get(&state, "/api/v1/allowlist/0xmember").await;
        assert_eq!(body["member"], true);

        let (_, body) = get(&state, "/api/v1/allowlist/0xstranger").await;
        assert_eq!(body["member"], false);
    }

    #[tokio::test]
    async fn test_share_route() {
        let state = test_state();

        let (status, _) = get(&state, "/api/v1/share/0xc0ffee/1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state.feed.hydrate().await;
        state.feed.load_more().await;

        let (status, body) = get(&state, "/api/v1/share/0xC0FFEE/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["strategy"], "composeUrl");
        assert_eq!(body["text"], "Study 1 by @alice");
        assert_eq!(body["embedUrl"], "https://curio.test/item/0xC0FFEE/1");
    }
}
