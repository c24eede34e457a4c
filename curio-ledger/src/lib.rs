//! # Curio Ledger
//!
//! Ledger reads for the feed: who authored a contract, and where an item's
//! metadata lives.
//!
//! [`JsonRpcLedger`] talks to a JSON-RPC node. [`ContractOwnerResolver`]
//! puts a retrying, coalescing, failure-forgetting cache in front of any
//! [`LedgerReader`](curio_core::LedgerReader).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod owner;
mod retry;
mod rpc;

pub use owner::{ContractOwnerResolver, OwnerResolverConfig};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use rpc::{
    decode_address, decode_string, encode_uint256, selector, JsonRpcLedger, RpcConfig,
    OWNER_SIGNATURE, TOKEN_URI_SIGNATURE, URI_SIGNATURE,
};
