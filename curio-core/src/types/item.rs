//! Feed item types.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{PLACEHOLDER_IMAGE_URL, UNTITLED_ITEM};

/// Unique key of a feed item: `(contract_ref, item_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    /// Lowercased contract reference
    pub contract_ref: String,
    /// Item id within the contract
    pub item_id: String,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.contract_ref, self.item_id)
    }
}

/// A feed candidate as listed by the candidate source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemConfig {
    /// Contract address on the ledger
    pub contract_ref: String,
    /// Token id within the contract
    #[serde(deserialize_with = "string_or_number")]
    pub item_id: String,
}

impl ItemConfig {
    /// Creates a new item config.
    pub fn new(contract_ref: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            contract_ref: contract_ref.into(),
            item_id: item_id.into(),
        }
    }

    /// Returns the unique key of this item.
    pub fn key(&self) -> ItemKey {
        ItemKey {
            contract_ref: self.contract_ref.trim().to_lowercase(),
            item_id: self.item_id.trim().to_string(),
        }
    }
}

/// Metadata document referenced by an item's metadata URI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Image URI
    #[serde(default)]
    pub image: Option<String>,
    /// Alternate image field used by some minting tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Media URI for animated items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_url: Option<String>,
}

impl ItemMetadata {
    /// Returns the first non-empty of `image`, `image_url`, `animation_url`.
    pub fn image_uri(&self) -> Option<&str> {
        [&self.image, &self.image_url, &self.animation_url]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .find(|uri| !uri.is_empty())
    }
}

/// A feed item with metadata and author resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedItem {
    /// Display name
    pub name: String,
    /// Description (may be empty)
    pub description: String,
    /// Displayable image URL
    pub image_url: String,
    /// Address that authored the item (empty if unresolved)
    pub author_address: String,
    /// Human display name of the author
    pub author_display_name: String,
    /// Contract address on the ledger
    pub contract_ref: String,
    /// Token id within the contract
    pub item_id: String,
}

impl ResolvedItem {
    /// Builds an item from its config, fetched metadata and resolved author.
    ///
    /// Missing metadata fields fall back to placeholders so a degraded item
    /// still renders.
    pub fn assemble(
        config: &ItemConfig,
        metadata: ItemMetadata,
        image_url: Option<String>,
        author_address: impl Into<String>,
        author_display_name: impl Into<String>,
    ) -> Self {
        Self {
            name: metadata
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_ITEM.to_string()),
            description: metadata.description.unwrap_or_default(),
            image_url: image_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string()),
            author_address: author_address.into(),
            author_display_name: author_display_name.into(),
            contract_ref: config.contract_ref.clone(),
            item_id: config.item_id.clone(),
        }
    }

    /// Returns the unique key of this item.
    pub fn key(&self) -> ItemKey {
        ItemConfig::new(&self.contract_ref, &self.item_id).key()
    }

    /// Returns the config this item was resolved from.
    pub fn config(&self) -> ItemConfig {
        ItemConfig::new(&self.contract_ref, &self.item_id)
    }

    /// Case-insensitive substring match over name, author address and author name.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        self.name.to_lowercase().contains(&needle)
            || self.author_address.to_lowercase().contains(&needle)
            || self.author_display_name.to_lowercase().contains(&needle)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> ResolvedItem {
        ResolvedItem {
            name: "Sunset Study".into(),
            description: String::new(),
            image_url: "https://ipfs.io/ipfs/Qm".into(),
            author_address: "0xAbC0000000000000000000000000000000000001".into(),
            author_display_name: "alice".into(),
            contract_ref: "0xC0ffee0000000000000000000000000000000001".into(),
            item_id: "7".into(),
        }
    }

    #[test]
    fn test_key_normalizes_contract() {
        let a = ItemConfig::new("0xABC", "1");
        let b = ItemConfig::new(" 0xabc ", "1");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), ItemConfig::new("0xabc", "2").key());
    }

    #[test]
    fn test_config_accepts_numeric_item_id() {
        let config: ItemConfig =
            serde_json::from_str(r#"{"contractRef":"0xabc","itemId":42}"#).unwrap();
        assert_eq!(config.item_id, "42");

        let config: ItemConfig =
            serde_json::from_str(r#"{"contractRef":"0xabc","itemId":"43"}"#).unwrap();
        assert_eq!(config.item_id, "43");
    }

    #[test]
    fn test_metadata_image_aliases() {
        let meta: ItemMetadata =
            serde_json::from_str(r#"{"name":"A","image_url":"ipfs://Qm"}"#).unwrap();
        assert_eq!(meta.image_uri(), Some("ipfs://Qm"));
        assert!(meta.description.is_none());

        let meta: ItemMetadata = serde_json::from_str(
            r#"{"image":" ","animation_url":"ar://clip","image_url":null}"#,
        )
        .unwrap();
        assert_eq!(meta.image_uri(), Some("ar://clip"));
    }

    #[test]
    fn test_assemble_uses_placeholders() {
        let config = ItemConfig::new("0xabc", "1");
        let item = ResolvedItem::assemble(&config, ItemMetadata::default(), None, "", "unknown");

        assert_eq!(item.name, UNTITLED_ITEM);
        assert_eq!(item.image_url, PLACEHOLDER_IMAGE_URL);
        assert!(item.description.is_empty());
        assert_eq!(item.key(), config.key());
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let item = sample_item();
        assert!(item.matches("sunset"));
        assert!(item.matches("ALICE"));
        assert!(item.matches("0xabc0"));
        assert!(item.matches(""));
        assert!(!item.matches("bob"));
    }
}
