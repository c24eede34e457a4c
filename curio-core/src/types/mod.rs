//! Domain types for Curio.
//!
//! - [`ItemConfig`]: identity key of one feed candidate
//! - [`ResolvedItem`]: a candidate with metadata and author resolved
//! - [`CacheEntry`]: a timestamped cached value
//! - [`FeedState`]: the persisted working set of the feed aggregator

mod cache;
mod feed;
mod identity;
mod item;

pub use cache::*;
pub use feed::*;
pub use identity::*;
pub use item::*;
