//! Error types for Curio.
//!
//! This module provides the error hierarchy using `thiserror`. Classification
//! helpers let callers pick a fallback policy (retry, degrade, cache a
//! negative result) without matching on every variant.

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using `CurioError`.
pub type Result<T> = std::result::Result<T, CurioError>;

/// Main error type for all Curio operations.
#[derive(Debug, Error)]
pub enum CurioError {
    // ═══════════════════════════════════════════════════════════════════════════
    // UPSTREAM ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// HTTP request failed (network error or non-success status).
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {millis}ms: {target}")]
    Timeout { target: String, millis: u64 },

    /// Upstream (or the local limiter) refused the call; try again later.
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// JSON-RPC call failed.
    #[error("RPC call failed: {0}")]
    RpcError(String),

    /// Upstream answered, but has no value for the key.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream answered with a body we cannot interpret.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Every gateway for one resource failed.
    #[error("All {attempts} gateways failed: {last_error}")]
    AllGatewaysFailed { attempts: usize, last_error: String },

    /// Ledger read exhausted its retries.
    #[error("Ledger read failed for '{target}' after {attempts} attempts: {reason}")]
    LedgerReadFailed {
        target: String,
        attempts: u32,
        reason: String,
    },

    /// A coalesced request failed; every waiter receives the same error.
    #[error(transparent)]
    Coalesced(Arc<CurioError>),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    HexError(#[from] hex::FromHexError),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Key-value store rejected an operation.
    #[error("Storage error: {0}")]
    StorageError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid content identifier.
    #[error("Invalid IPFS CID: {0}")]
    InvalidIpfsCid(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl CurioError {
    /// Returns the underlying error, looking through coalesced wrappers.
    pub fn root(&self) -> &CurioError {
        match self {
            CurioError::Coalesced(inner) => inner.root(),
            other => other,
        }
    }

    /// Returns true if this error is transient and the call can be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root(),
            CurioError::HttpError(_)
                | CurioError::Timeout { .. }
                | CurioError::RpcError(_)
                | CurioError::AllGatewaysFailed { .. }
        )
    }

    /// Returns true if the upstream asked us to back off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.root(), CurioError::RateLimited(_))
    }

    /// Returns true if the upstream has no value for the requested key.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), CurioError::NotFound(_))
    }

    /// Returns true if the upstream answered with an unusable body.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self.root(),
            CurioError::MalformedResponse(_) | CurioError::JsonError(_)
        )
    }
}

impl From<Arc<CurioError>> for CurioError {
    fn from(err: Arc<CurioError>) -> Self {
        CurioError::Coalesced(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CurioError::AllGatewaysFailed {
            attempts: 3,
            last_error: "HTTP 500".into(),
        };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CurioError::HttpError("test".into()).is_recoverable());
        assert!(CurioError::Timeout {
            target: "https://ipfs.io".into(),
            millis: 15_000
        }
        .is_recoverable());
        assert!(!CurioError::NotFound("x".into()).is_recoverable());

        assert!(CurioError::RateLimited("identity".into()).is_rate_limited());
        assert!(!CurioError::HttpError("test".into()).is_rate_limited());

        assert!(CurioError::MalformedResponse("html".into()).is_malformed());
    }

    #[test]
    fn test_coalesced_classified_by_root() {
        let shared = Arc::new(CurioError::RateLimited("identity".into()));
        let err = CurioError::from(shared.clone());
        assert!(err.is_rate_limited());

        let nested = CurioError::Coalesced(Arc::new(err));
        assert!(nested.is_rate_limited());
        assert!(matches!(nested.root(), CurioError::RateLimited(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_result: std::result::Result<serde_json::Value, _> = serde_json::from_str("<html>");
        let curio_result: Result<serde_json::Value> = json_result.map_err(CurioError::from);
        assert!(matches!(curio_result, Err(CurioError::JsonError(_))));
        assert!(curio_result.unwrap_err().is_malformed());
    }
}
