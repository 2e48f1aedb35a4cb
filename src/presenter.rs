/// Toolbar badge, icon and tooltip derived from tab counts
use serde::{Deserialize, Serialize};

use crate::counts::Counts;
use crate::settings::{BadgeColor, Settings};

/// Domains with fewer tabs than this are left out of the tooltip
pub const PRESENTED_DOMAIN_MIN: usize = 5;

/// Duplicate titles are cut to this many characters in the tooltip
pub const TITLE_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconState {
    Active,
    Inactive,
}

/// Localised tooltip labels; the host's i18n layer may override them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Labels {
    pub total_tabs: String,
    pub duplicate_tabs: String,
    pub duplicate_urls_found: String,
    pub top_domains: String,
}

impl Default for Labels {
    fn default() -> Self {
        Labels {
            total_tabs: "Tabs".to_string(),
            duplicate_tabs: "Duplicates".to_string(),
            duplicate_urls_found: "Duplicate sites".to_string(),
            top_domains: "Top Domains".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub icon_state: IconState,
    pub badge_text: String,
    pub badge_color: [u8; 4],
    pub tooltip_text: String,
}

pub fn present(counts: &Counts, settings: &Settings, labels: &Labels) -> Presentation {
    let mut tooltip_text = format!(
        "{}: {} || {}: {}\n",
        labels.total_tabs, counts.total_tabs, labels.duplicate_tabs, counts.duplicate_count
    );
    tooltip_text.push_str(&top_domains_section(counts, labels));

    if counts.duplicate_count == 0 {
        let badge_text = if settings.show_tab_count {
            counts.total_tabs.to_string()
        } else {
            String::new()
        };

        return Presentation {
            icon_state: IconState::Inactive,
            badge_text,
            badge_color: BadgeColor::NEUTRAL,
            tooltip_text,
        };
    }

    let mut lines: Vec<String> = counts
        .duplicates_list
        .iter()
        .map(|dup| format!("{} : {}", dup.count, truncate(&dup.title, TITLE_WIDTH)))
        .collect();
    lines.sort_by(|a, b| b.cmp(a));

    tooltip_text.push_str(&format!("## {}\n{}", labels.duplicate_urls_found, lines.join("\n")));

    Presentation {
        icon_state: IconState::Active,
        badge_text: counts.duplicate_count.to_string(),
        badge_color: settings.badge_color.rgba(),
        tooltip_text,
    }
}

fn top_domains_section(counts: &Counts, labels: &Labels) -> String {
    let lines: Vec<String> = counts
        .top_domains_at_least(PRESENTED_DOMAIN_MIN)
        .map(|d| format!("{} : {}", d.count, d.domain))
        .collect();

    if lines.is_empty() {
        String::new()
    } else {
        format!("## {}\n{}\n", labels.top_domains, lines.join("\n"))
    }
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}
