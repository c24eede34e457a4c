//! Share actions for feed items.

use serde::{Deserialize, Serialize};
use url::Url;

use curio_core::constants::UNKNOWN_IDENTITY;
use curio_core::types::ResolvedItem;

/// Compose page used outside an embedding host.
pub const COMPOSE_URL: &str = "https://warpcast.com/~/compose";

/// Where the presentation layer is running.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostEnvironment {
    /// A plain browser tab
    #[default]
    Standalone,
    /// Inside a host app that provides its own composer
    Embedded {
        /// Host identifier
        host: String,
    },
}

impl HostEnvironment {
    /// Embedded when a host name is given, standalone otherwise.
    pub fn from_host(host: Option<&str>) -> Self {
        match host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => HostEnvironment::Embedded {
                host: host.to_string(),
            },
            None => HostEnvironment::Standalone,
        }
    }
}

/// How a share is carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShareStrategy {
    /// Open a compose URL carrying text and embed
    ComposeUrl,
    /// Hand text and embed to the host's composer
    EmbeddedComposer,
}

impl ShareStrategy {
    /// Picks the strategy for an environment.
    pub fn for_environment(env: &HostEnvironment) -> Self {
        match env {
            HostEnvironment::Standalone => ShareStrategy::ComposeUrl,
            HostEnvironment::Embedded { .. } => ShareStrategy::EmbeddedComposer,
        }
    }
}

/// Everything needed to share one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAction {
    /// Selected strategy
    pub strategy: ShareStrategy,
    /// Post text
    pub text: String,
    /// Link embedded in the post
    pub embed_url: String,
    /// Compose page to open; only for [`ShareStrategy::ComposeUrl`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_url: Option<String>,
}

/// Builds the share action for an item.
pub fn share_action(item: &ResolvedItem, app_url: &str, env: &HostEnvironment) -> ShareAction {
    let strategy = ShareStrategy::for_environment(env);
    let text = share_text(item);
    let embed_url = format!(
        "{}/item/{}/{}",
        app_url.trim_end_matches('/'),
        item.contract_ref,
        item.item_id
    );

    let compose_url = match strategy {
        ShareStrategy::ComposeUrl => Url::parse_with_params(
            COMPOSE_URL,
            &[("text", text.as_str()), ("embeds[]", embed_url.as_str())],
        )
        .ok()
        .map(String::from),
        ShareStrategy::EmbeddedComposer => None,
    };

    ShareAction {
        strategy,
        text,
        embed_url,
        compose_url,
    }
}

fn share_text(item: &ResolvedItem) -> String {
    let author = item.author_display_name.trim();
    if author.is_empty() || author == UNKNOWN_IDENTITY {
        match short_address(&item.author_address) {
            Some(addr) => format!("{} by {}", item.name, addr),
            None => item.name.clone(),
        }
    } else {
        format!("{} by @{}", item.name, author)
    }
}

fn short_address(address: &str) -> Option<String> {
    let address = address.trim();
    if address.len() < 10 || !address.is_ascii() {
        return (!address.is_empty()).then(|| address.to_string());
    }
    Some(format!("{}…{}", &address[..6], &address[address.len() - 4..]))
}
