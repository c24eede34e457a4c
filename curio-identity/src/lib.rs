//! # Curio Identity
//!
//! Resolves wallet addresses to human display names.
//!
//! The chain is: primary username service, then the secondary (basename)
//! service, then the `"unknown"` sentinel. Every upstream is paced by its
//! own [`RateLimiter`], and lookups go through coalescing caches.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod batch;
mod client;
mod ratelimit;
mod resolver;

pub use batch::BatchIdentityResolver;
pub use client::{BasenameClient, HttpIdentityClient, IdentityClientConfig};
pub use ratelimit::RateLimiter;
pub use resolver::{IdentityResolver, IdentityResolverConfig};
