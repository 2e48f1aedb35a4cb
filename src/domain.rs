/// Domain extraction and ranking
use std::collections::HashMap;

/// Number of domains kept in the top-domain ranking
pub const TOP_DOMAIN_LIMIT: usize = 15;

/// Extract the host part of a URL
///
/// Algorithm:
/// 1. Strip a leading `http://` or `https://`
/// 2. Cut at the first `/`, `?` or `#`
///
/// Other schemes are kept, so `chrome://newtab/` ranks as `chrome:` and
/// `about:blank` as itself.
///
/// Examples:
/// - https://sub.example.com/path?q=1 → sub.example.com
/// - http://localhost:3000/app → localhost:3000
pub fn extract_domain(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Sum tab occurrences per domain from per-URL counts
pub fn count_domains<'a, I>(url_counts: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = (&'a String, &'a usize)>,
{
    url_counts
        .into_iter()
        .fold(HashMap::new(), |mut counts, (url, count)| {
            *counts.entry(extract_domain(url)).or_insert(0) += count;
            counts
        })
}

/// Domains ordered by tab count, busiest first, equal counts by name; at most `limit`
pub fn rank_domains(counts: &HashMap<String, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(&String, usize)> = counts.iter().map(|(domain, &count)| (domain, count)).collect();
    ranked.sort_unstable_by(|(a, a_count), (b, b_count)| b_count.cmp(a_count).then_with(|| a.cmp(b)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(domain, count)| (domain.clone(), count))
        .collect()
}
