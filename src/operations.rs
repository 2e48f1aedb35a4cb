/// Tab operations: picking which duplicates to close and where survivors go
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::tab_data::{TabId, TabRecord};

/// Move `tab_id` to position `index` within its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabMove {
    pub tab_id: TabId,
    pub index: i32,
}

/// Outcome of a duplicate pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub to_close: Vec<TabId>,
    pub to_move: Vec<TabMove>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.to_close.is_empty() && self.to_move.is_empty()
    }
}

/// Sort tabs by window, then by URL ignoring case. Stable.
pub fn sort_tabs_by_window_and_url(tabs: &[TabRecord]) -> Vec<TabRecord> {
    let mut tabs_with_key: Vec<(String, TabRecord)> = tabs
        .iter()
        .map(|tab| (tab.normalized_url.to_lowercase(), tab.clone()))
        .collect();

    tabs_with_key.sort_by(|a, b| a.1.window_id.cmp(&b.1.window_id).then_with(|| a.0.cmp(&b.0)));

    tabs_with_key.into_iter().map(|(_, tab)| tab).collect()
}

/// Group tabs by normalised URL, groups and members in first-seen order
pub fn group_by_url(tabs: &[TabRecord]) -> Vec<Vec<&TabRecord>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&TabRecord>> = Vec::new();

    for tab in tabs {
        let slot = *index.entry(tab.normalized_url.as_str()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(tab);
    }

    groups
}

/// Choose the surviving tab of a duplicate group.
///
/// Active tabs win, then pinned ones, then everything else; ties go to the
/// lowest (window id, tab id), i.e. the oldest tab.
pub fn pick_tab_to_keep<'a>(group: &[&'a TabRecord]) -> Option<&'a TabRecord> {
    oldest(group.iter().copied().filter(|t| t.active))
        .or_else(|| oldest(group.iter().copied().filter(|t| t.pinned)))
        .or_else(|| oldest(group.iter().copied()))
}

fn oldest<'a>(tabs: impl Iterator<Item = &'a TabRecord>) -> Option<&'a TabRecord> {
    tabs.min_by_key(|t| (t.window_id, t.id))
}

/// Decide which tabs to close and, when sorting, where the survivors move.
///
/// Deterministic for a given input order.
pub fn resolve(tabs: &[TabRecord], sort_enabled: bool) -> Resolution {
    let ordered = if sort_enabled {
        sort_tabs_by_window_and_url(tabs)
    } else {
        tabs.to_vec()
    };

    let mut to_close = Vec::new();
    for group in group_by_url(&ordered) {
        if group.len() <= 1 {
            continue;
        }
        let Some(keep) = pick_tab_to_keep(&group) else {
            continue;
        };
        to_close.extend(group.iter().filter(|t| t.id != keep.id).map(|t| t.id));
    }

    let mut to_move = Vec::new();
    if sort_enabled {
        let closing: HashSet<TabId> = to_close.iter().copied().collect();
        let mut current_window = None;
        let mut next_index = 0;

        for tab in ordered.iter().filter(|t| !closing.contains(&t.id)) {
            if current_window != Some(tab.window_id) {
                current_window = Some(tab.window_id);
                next_index = 0;
            }
            to_move.push(TabMove {
                tab_id: tab.id,
                index: next_index,
            });
            next_index += 1;
        }
    }

    Resolution { to_close, to_move }
}
