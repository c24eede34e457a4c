//! Optional durable cache tier.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use curio_core::traits::KeyValueStore;

/// Typed access to an optional [`KeyValueStore`].
///
/// Without a store every call is a no-op. Store failures and undecodable
/// values are logged and reported as misses, never as errors.
#[derive(Clone, Default)]
pub struct DurableTier {
    store: Option<Arc<dyn KeyValueStore>>,
}

impl DurableTier {
    /// Wraps an optional store.
    pub fn new(store: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self { store }
    }

    /// A tier without a store.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    /// Returns true if a store is attached.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Reads and decodes a value.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;

        let raw = match store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Durable read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Discarding undecodable durable entry");
                if let Err(e) = store.remove(key).await {
                    warn!(key, error = %e, "Durable remove failed");
                }
                None
            }
        }
    }

    /// Encodes and writes a value.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Durable encode failed");
                return;
            }
        };

        if let Err(e) = store.set(key, raw).await {
            warn!(key, error = %e, "Durable write failed");
        }
    }

    /// Deletes a value.
    pub async fn delete(&self, key: &str) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.remove(key).await {
                warn!(key, error = %e, "Durable remove failed");
            }
        }
    }

    /// Writes out anything the store buffered.
    pub async fn flush(&self) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.flush().await {
                warn!(error = %e, "Durable flush failed");
            }
        }
    }
}
