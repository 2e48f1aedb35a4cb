/// Data structures for tabs as the browser reports them and as the agent stores them
use serde::{Deserialize, Serialize};

use crate::suspender::normalize_url;

/// Browser-assigned tab identifier. Unique among open tabs, may be reused after close.
pub type TabId = i32;

/// Browser-assigned window identifier.
pub type WindowId = i32;

/// Information about a browser tab, in the shape `chrome.tabs.query` returns it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub window_id: WindowId,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub index: i32,
}

impl TabInfo {
    pub fn new(id: TabId, url: &str, title: &str, window_id: WindowId) -> TabInfo {
        TabInfo {
            id,
            url: url.to_string(),
            title: title.to_string(),
            window_id,
            ..TabInfo::default()
        }
    }

    pub fn pinned(mut self) -> TabInfo {
        self.pinned = true;
        self
    }

    pub fn active(mut self) -> TabInfo {
        self.active = true;
        self
    }
}

/// A tab as held by the agent, keyed on its suspender-free URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub id: TabId,
    pub normalized_url: String,
    pub raw_url: String,
    pub title: String,
    pub is_suspended: bool,
    pub window_id: WindowId,
    pub pinned: bool,
    pub active: bool,
}

impl From<&TabInfo> for TabRecord {
    fn from(tab: &TabInfo) -> TabRecord {
        let normalized_url = normalize_url(&tab.url);
        TabRecord {
            id: tab.id,
            is_suspended: !tab.url.is_empty() && normalized_url != tab.url,
            normalized_url,
            raw_url: tab.url.clone(),
            title: tab.title.clone(),
            window_id: tab.window_id,
            pinned: tab.pinned,
            active: tab.active,
        }
    }
}
