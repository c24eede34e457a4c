//! Metadata fetching over redundant gateways.
//!
//! A metadata URI found on the ledger is expanded into candidate URLs
//! (IPFS, Arweave, plain HTTP) or decoded inline (`data:` URIs). The
//! [`GatewayFetcher`] tries candidates in order until one returns a
//! structured document.

mod gateway;
mod metadata;
mod uri;

pub use gateway::{GatewayFetcher, GatewayResponse};
pub use metadata::{parse_metadata, MetadataClient, INLINE_SOURCE};
pub use uri::{display_image_url, expand_uri, validate_cid, GatewayConfig, ResourceLocation};
