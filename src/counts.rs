/// Tab statistics derived from a cache snapshot
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{count_domains, rank_domains, TOP_DOMAIN_LIMIT};
use crate::tab_data::TabRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

/// A URL open in more than one tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEntry {
    pub url: String,
    pub count: usize,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub total_tabs: usize,
    pub unique_urls: usize,
    #[serde(rename = "duplicates")]
    pub duplicate_count: usize,
    #[serde(rename = "duplicatesCloseable")]
    pub duplicate_closeable_count: usize,
    pub per_url_counts: BTreeMap<String, usize>,
    pub per_domain_counts: BTreeMap<String, usize>,
    pub top_domains: Vec<DomainCount>,
    pub duplicates_list: Vec<DuplicateEntry>,
}

/// Whether duplicates of `url` may be closed automatically.
///
/// New-tab and about:blank pages count like any other page; only a blank URL is exempt.
pub fn is_closeable_url(url: &str) -> bool {
    !url.is_empty()
}

/// Count tabs, distinct URLs and duplicates over `tabs`
pub fn aggregate(tabs: &[TabRecord]) -> Counts {
    let mut per_url_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut titles: HashMap<&str, &str> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for tab in tabs {
        let url = tab.normalized_url.as_str();
        let count = per_url_counts.entry(url.to_string()).or_insert(0);
        if *count == 0 {
            first_seen.push(url);
        }
        *count += 1;

        // Latest non-empty title wins, falling back to the URL itself
        if !tab.title.is_empty() {
            titles.insert(url, &tab.title);
        } else {
            titles.entry(url).or_insert(url);
        }
    }

    let total_tabs = tabs.len();
    let unique_urls = per_url_counts.len();

    let duplicate_closeable_count: usize = per_url_counts
        .iter()
        .filter(|(url, _)| is_closeable_url(url))
        .map(|(_, count)| count.saturating_sub(1))
        .sum();

    let mut duplicates_list: Vec<DuplicateEntry> = first_seen
        .iter()
        .filter_map(|url| {
            let count = per_url_counts[*url];
            (count > 1).then(|| DuplicateEntry {
                url: url.to_string(),
                count,
                title: titles.get(url).copied().unwrap_or(*url).to_string(),
            })
        })
        .collect();
    // Stable: equal counts stay in first-seen order
    duplicates_list.sort_by(|a, b| b.count.cmp(&a.count));

    let domain_counts = count_domains(&per_url_counts);
    let top_domains = rank_domains(&domain_counts, TOP_DOMAIN_LIMIT)
        .into_iter()
        .map(|(domain, count)| DomainCount { domain, count })
        .collect();

    Counts {
        total_tabs,
        unique_urls,
        duplicate_count: total_tabs - unique_urls,
        duplicate_closeable_count,
        per_domain_counts: domain_counts.into_iter().collect(),
        per_url_counts,
        top_domains,
        duplicates_list,
    }
}

impl Counts {
    /// Top domains with at least `min` tabs
    pub fn top_domains_at_least(&self, min: usize) -> impl Iterator<Item = &DomainCount> {
        self.top_domains.iter().filter(move |d| d.count >= min)
    }
}
