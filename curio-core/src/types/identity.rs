//! Identity lookup types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Normalizes a wallet address for cache keys and comparisons.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Response of the batch identity endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUsernames {
    /// Address → username; absent or null when the address has none
    #[serde(default)]
    pub usernames: HashMap<String, Option<String>>,
    /// Set when the upstream refused the batch
    #[serde(default)]
    pub rate_limited: bool,
}

impl BatchUsernames {
    /// Looks up an address, ignoring case.
    pub fn get(&self, address: &str) -> Option<&str> {
        let wanted = normalize_address(address);
        self.usernames
            .iter()
            .find(|(addr, _)| normalize_address(addr) == wanted)
            .and_then(|(_, name)| name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}
