//! API route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{debug, info};

use curio_core::traits::Allowlist;
use curio_core::types::{normalize_address, ItemConfig};
use curio_feed::{share_action, FeedSnapshot, LoadReport, RetryReport, ShareAction};

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

// ═══════════════════════════════════════════════════════════════════════════
// Feed Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// GET /api/v1/feed
pub async fn get_feed(State(state): State<Arc<AppState>>) -> Json<FeedSnapshot> {
    Json(state.feed.snapshot())
}

/// POST /api/v1/feed/more
pub async fn load_more(State(state): State<Arc<AppState>>) -> Json<LoadReport> {
    Json(state.feed.load_more().await)
}

/// POST /api/v1/feed/retry
pub async fn retry_failures(State(state): State<Arc<AppState>>) -> Json<RetryReport> {
    Json(state.feed.process_failures().await)
}

/// GET /api/v1/feed/search?q=
pub async fn search_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<SearchResponse> {
    let items = state.feed.query(&params.q);
    debug!(query = %params.q, matches = items.len(), "Feed search");

    Json(SearchResponse {
        query: params.q,
        count: items.len(),
        items,
    })
}

/// POST /api/v1/feed/artist?q=
pub async fn load_artist(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<LoadReport>> {
    if params.q.trim().is_empty() {
        return Err(ApiError::bad_request("Query parameter 'q' is required"));
    }
    Ok(Json(state.feed.load_artist(&params.q).await))
}

// ═══════════════════════════════════════════════════════════════════════════
// Identity & Ledger Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// GET /api/v1/identity/:address
pub async fn resolve_identity(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<IdentityResponse>> {
    let address = normalize_address(&address);
    if address.is_empty() {
        return Err(ApiError::bad_request("Address is required"));
    }

    let display_name = state.identities.resolve_one(&address).await;
    Ok(Json(IdentityResponse {
        address,
        display_name,
    }))
}

/// POST /api/v1/identity/batch
pub async fn resolve_identity_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchIdentityRequest>,
) -> Result<Json<BatchIdentityResponse>> {
    if req.addresses.len() > MAX_BATCH_ADDRESSES {
        return Err(ApiError::validation(format!(
            "At most {} addresses per request",
            MAX_BATCH_ADDRESSES
        )));
    }

    let names = state.identities.resolve_many(&req.addresses).await;
    info!(requested = req.addresses.len(), resolved = names.len(), "Batch identity lookup");
    Ok(Json(BatchIdentityResponse { names }))
}

/// GET /api/v1/owner/:contract
pub async fn resolve_owner(
    State(state): State<Arc<AppState>>,
    Path(contract): Path<String>,
) -> Result<Json<OwnerResponse>> {
    let owner = state.owners.resolve_owner(&contract).await?;
    Ok(Json(OwnerResponse { contract, owner }))
}

/// GET /api/v1/allowlist/:address
pub async fn check_allowlist(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AllowlistResponse>> {
    let member = state.allowlist.is_member(&address).await?;
    Ok(Json(AllowlistResponse { address, member }))
}

/// GET /api/v1/share/:contract/:item
pub async fn share_item(
    State(state): State<Arc<AppState>>,
    Path((contract, item_id)): Path<(String, String)>,
) -> Result<Json<ShareAction>> {
    let key = ItemConfig::new(&contract, &item_id).key();
    let item = state
        .feed
        .item(&key)
        .ok_or_else(|| ApiError::not_found(format!("Item {} is not in the feed", key)))?;

    Ok(Json(share_action(
        &item,
        &state.config.app_url,
        &state.environment,
    )))
}

// ═══════════════════════════════════════════════════════════════════════════
// Health
// ═══════════════════════════════════════════════════════════════════════════

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.feed.snapshot();

    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        feed_items: snapshot.items.len(),
        feed_total: snapshot.total,
    })
}
