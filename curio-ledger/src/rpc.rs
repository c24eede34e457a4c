//! JSON-RPC ledger reader.
//!
//! Reads contract state with `eth_call`. Calldata is a 4-byte Keccak-256
//! selector followed by 32-byte ABI words; return data is decoded by hand.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::{debug, instrument, warn};

use curio_core::constants::{DEFAULT_RPC_URL, REQUEST_TIMEOUT};
use curio_core::error::{CurioError, Result};
use curio_core::traits::LedgerReader;

/// `owner()`: authorship of an ownable contract.
pub const OWNER_SIGNATURE: &str = "owner()";
/// `uri(uint256)`: multi-token metadata URI, may contain `{id}`.
pub const URI_SIGNATURE: &str = "uri(uint256)";
/// `tokenURI(uint256)`: single-token metadata URI.
pub const TOKEN_URI_SIGNATURE: &str = "tokenURI(uint256)";

/// RPC client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl RpcConfig {
    /// Creates a configuration for the given endpoint.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    message: String,
}

/// [`LedgerReader`] over JSON-RPC `eth_call`.
pub struct JsonRpcLedger {
    config: RpcConfig,
    http_client: reqwest::Client,
}

impl JsonRpcLedger {
    /// Creates a reader for the given endpoint.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self> {
        Self::with_config(RpcConfig::new(rpc_url))
    }

    /// Creates a reader with custom configuration.
    pub fn with_config(config: RpcConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CurioError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Issues `eth_call` against `to` and returns the raw return data.
    #[instrument(skip(self, calldata))]
    pub async fn eth_call(&self, to: &str, calldata: &[u8]) -> Result<Vec<u8>> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [
                {
                    "to": to,
                    "data": format!("0x{}", hex::encode(calldata))
                },
                "latest"
            ],
            "id": 1
        });

        let response = self
            .http_client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(CurioError::RateLimited("rpc".into()));
            }
            status if !status.is_success() => {
                return Err(CurioError::HttpError(format!("rpc returned {}", status)));
            }
            _ => {}
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| CurioError::MalformedResponse(format!("rpc body: {}", e)))?;

        if let Some(error) = body.error {
            warn!(to, error = %error.message, "RPC error");
            return Err(CurioError::RpcError(error.message));
        }

        let result = body
            .result
            .ok_or_else(|| CurioError::MalformedResponse("rpc response without result".into()))?;
        let data = result.strip_prefix("0x").unwrap_or(&result);

        Ok(hex::decode(data)?)
    }

    async fn call_string(&self, contract: &str, signature: &str, arg: &[u8; 32]) -> Result<String> {
        let mut calldata = selector(signature).to_vec();
        calldata.extend_from_slice(arg);
        let data = self.eth_call(contract, &calldata).await?;
        decode_string(&data)
    }

    fn transport_error(&self, e: reqwest::Error) -> CurioError {
        if e.is_timeout() {
            CurioError::Timeout {
                target: self.config.rpc_url.clone(),
                millis: self.config.timeout.as_millis() as u64,
            }
        } else {
            CurioError::HttpError(format!("rpc: {}", e))
        }
    }
}

#[async_trait]
impl LedgerReader for JsonRpcLedger {
    async fn owner_of(&self, contract_ref: &str) -> Result<String> {
        let data = self.eth_call(contract_ref, &selector(OWNER_SIGNATURE)).await?;
        decode_address(&data)
    }

    async fn metadata_uri_of(&self, contract_ref: &str, item_id: &str) -> Result<String> {
        let id = encode_uint256(item_id)?;

        match self.call_string(contract_ref, URI_SIGNATURE, &id).await {
            Ok(uri) if !uri.trim().is_empty() => {
                return Ok(uri.trim().replace("{id}", &hex::encode(id)));
            }
            Ok(_) => debug!(contract_ref, item_id, "uri() empty, trying tokenURI()"),
            Err(e) => debug!(contract_ref, item_id, error = %e, "uri() failed, trying tokenURI()"),
        }

        let uri = self.call_string(contract_ref, TOKEN_URI_SIGNATURE, &id).await?;
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(CurioError::NotFound(format!(
                "metadata uri for {}:{}",
                contract_ref, item_id
            )));
        }
        Ok(uri.to_string())
    }
}

/// Returns the 4-byte function selector for a signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Encodes a decimal or `0x`-hex token id as a big-endian 32-byte word.
pub fn encode_uint256(id: &str) -> Result<[u8; 32]> {
    let id = id.trim();
    let mut word = [0u8; 32];

    if let Some(digits) = id.strip_prefix("0x") {
        if digits.is_empty() || digits.len() > 64 {
            return Err(CurioError::ValidationError(format!("invalid token id: {}", id)));
        }
        hex::decode_to_slice(format!("{:0>64}", digits), &mut word)?;
        return Ok(word);
    }

    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CurioError::ValidationError(format!("invalid token id: {}", id)));
    }

    for digit in id.bytes() {
        let mut carry = u32::from(digit - b'0');
        for byte in word.iter_mut().rev() {
            let v = u32::from(*byte) * 10 + carry;
            *byte = (v & 0xff) as u8;
            carry = v >> 8;
        }
        if carry != 0 {
            return Err(CurioError::ValidationError(format!(
                "token id exceeds 256 bits: {}",
                id
            )));
        }
    }

    Ok(word)
}

/// Decodes an ABI `address` return value.
pub fn decode_address(data: &[u8]) -> Result<String> {
    if data.len() < 32 {
        return Err(CurioError::MalformedResponse(format!(
            "address return is {} bytes",
            data.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(&data[12..32])))
}

/// Decodes an ABI `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String> {
    if data.len() < 64 {
        return Err(CurioError::MalformedResponse(format!(
            "string return is {} bytes",
            data.len()
        )));
    }

    let offset = read_word_usize(&data[..32])?;
    let length_end = offset
        .checked_add(32)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CurioError::MalformedResponse("string offset out of range".into()))?;
    let length = read_word_usize(&data[offset..length_end])?;
    let end = length_end
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CurioError::MalformedResponse("string length out of range".into()))?;

    String::from_utf8(data[length_end..end].to_vec())
        .map_err(|e| CurioError::MalformedResponse(format!("string is not utf-8: {}", e)))
}

fn read_word_usize(word: &[u8]) -> Result<usize> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(CurioError::MalformedResponse("ABI word too large".into()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..32]);
    usize::try_from(u64::from_be_bytes(tail))
        .map_err(|_| CurioError::MalformedResponse("ABI word too large".into()))
}
