/// Live view of open tabs, patched from browser events
use std::collections::BTreeMap;

use crate::tab_data::{TabId, TabInfo, TabRecord, WindowId};

/// Tab id → normalised record.
///
/// Only ever touched from the agent's event handler, so no locking. Between an
/// event firing and its handler running the cache may lag the browser; periodic
/// `reset` corrects any drift.
#[derive(Debug, Clone, Default)]
pub struct TabCache {
    records: BTreeMap<TabId, TabRecord>,
}

impl TabCache {
    pub fn new() -> Self {
        TabCache {
            records: BTreeMap::new(),
        }
    }

    /// Drop everything and rebuild from a full tab enumeration
    pub fn reset(&mut self, tabs: &[TabInfo]) {
        self.records = tabs
            .iter()
            .map(|tab| (tab.id, TabRecord::from(tab)))
            .collect();
        log::debug!("Tab cache rebuilt with {} tabs", self.records.len());
    }

    /// Insert or replace the record for `id`, normalising its URL
    pub fn upsert(&mut self, id: TabId, tab: &TabInfo) {
        let mut record = TabRecord::from(tab);
        record.id = id;

        if record.title.is_empty() {
            if let Some(previous) = self.records.get(&id) {
                record.title = previous.title.clone();
            }
        }

        self.records.insert(id, record);
    }

    pub fn remove(&mut self, id: TabId) -> Option<TabRecord> {
        self.records.remove(&id)
    }

    /// Mark `id` as the active tab of `window_id`. Returns false for unknown tabs.
    pub fn activate(&mut self, id: TabId, window_id: WindowId) -> bool {
        if !self.records.contains_key(&id) {
            return false;
        }

        for record in self.records.values_mut() {
            if record.window_id == window_id {
                record.active = record.id == id;
            }
        }
        true
    }

    pub fn get(&self, id: TabId) -> Option<&TabRecord> {
        self.records.get(&id)
    }

    /// Records in ascending tab id order
    pub fn snapshot(&self) -> Vec<TabRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
