//! # Curio Feed
//!
//! Paginated aggregation of ledger-referenced items into a displayable feed.
//!
//! ## Features
//!
//! - **Windowed Loading**: candidates resolve eight at a time, owners in
//!   parallel, identities in one batch, metadata sequentially
//! - **Failure Retry**: items whose metadata fails are retried on a delay,
//!   a bounded number of times
//! - **Persisted State**: the working set survives restarts for 30 minutes
//! - **Artist Loads**: targeted loading of one author's unloaded items
//!
//! ## Example
//!
//! ```rust,ignore
//! use curio_feed::{FeedAggregator, FeedConfig, FeedHandle, FeedServices};
//!
//! let feed = Arc::new(FeedAggregator::new(services, FeedConfig::default(), durable, clock));
//! let driver = FeedHandle::spawn(Arc::clone(&feed));
//!
//! // the reader scrolled near the bottom
//! driver.near_end().await?;
//!
//! for item in feed.query("alice") {
//!     println!("{} by {}", item.name, item.author_display_name);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod aggregator;
mod config;
mod driver;
mod retry;
mod share;
mod sources;
mod state;

#[cfg(test)]
mod testing;

pub use aggregator::{
    FeedAggregator, FeedPhase, FeedServices, FeedSnapshot, HydrateSource, LoadReport, RetryReport,
};
pub use config::FeedConfig;
pub use driver::{FeedHandle, FeedSignal};
pub use retry::{Requeue, RetryScheduler};
pub use share::{share_action, HostEnvironment, ShareAction, ShareStrategy, COMPOSE_URL};
pub use sources::{HttpCandidateSource, LedgerMetadataSource, StaticCandidateSource};
pub use state::{AuthorCache, FeedStateStore};
