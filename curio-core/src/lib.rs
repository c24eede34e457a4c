//! # Curio Core
//!
//! Core types, errors, and collaborator traits for the Curio feed pipeline.
//!
//! This crate provides the foundational building blocks used by all other Curio crates:
//!
//! - **Types**: feed items, cache entries, persisted feed state
//! - **Errors**: one error type with retry/degrade classification
//! - **Constants**: page sizes, cache lifetimes, upstream pacing
//! - **Traits**: identity services, ledger, candidate list, persistence, time
//!
//! ## Example
//!
//! ```rust
//! use curio_core::{ItemConfig, ResolvedItem, ItemMetadata};
//!
//! let config = ItemConfig::new("0xC0FFEE", "1");
//! let item = ResolvedItem::assemble(&config, ItemMetadata::default(), None, "", "unknown");
//! assert_eq!(item.key(), config.key());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod clock;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use clock::{ManualClock, SystemClock};
pub use error::{CurioError, Result};
pub use traits::*;
pub use types::*;
