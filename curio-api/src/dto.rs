//! DTOs for API requests and responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use curio_core::types::ResolvedItem;

/// Upper bound on addresses in one batch identity request.
pub const MAX_BATCH_ADDRESSES: usize = 1_000;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Items currently displayed
    pub feed_items: usize,
    /// Candidates known to the feed
    pub feed_total: usize,
}

/// `?q=` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    /// Search text
    #[serde(default)]
    pub q: String,
}

/// Response for a feed search.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// The query as received
    pub query: String,
    /// Number of matches
    pub count: usize,
    /// Matching items
    pub items: Vec<ResolvedItem>,
}

/// Response for a single identity lookup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    /// Normalised address
    pub address: String,
    /// Display name, or `"unknown"`
    pub display_name: String,
}

/// Request to resolve many addresses.
#[derive(Debug, Deserialize)]
pub struct BatchIdentityRequest {
    /// Addresses to resolve
    pub addresses: Vec<String>,
}

/// Response for a batch identity lookup.
#[derive(Debug, Serialize)]
pub struct BatchIdentityResponse {
    /// Normalised address → display name
    pub names: HashMap<String, String>,
}

/// Response for an owner lookup.
#[derive(Debug, Serialize)]
pub struct OwnerResponse {
    /// Contract as requested
    pub contract: String,
    /// Authorial address
    pub owner: String,
}

/// Response for an allowlist check.
#[derive(Debug, Serialize)]
pub struct AllowlistResponse {
    /// Address as requested
    pub address: String,
    /// True if the address is on the list
    pub member: bool,
}
