/// User settings persisted in chrome.storage.sync
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Storage area whose change notifications carry our settings
pub const SETTINGS_AREA: &str = "sync";

/// Badge background colour while duplicates are open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum BadgeColor {
    Red,
    Orange,
    Yellow,
    #[default]
    Green,
    Blue,
    Purple,
    Gray,
}

impl BadgeColor {
    /// Badge colour shown when there is nothing to close
    pub const NEUTRAL: [u8; 4] = [128, 128, 128, 255];

    /// Case-insensitive lookup; unknown names fall back to red
    pub fn from_name(name: &str) -> BadgeColor {
        match name.to_ascii_lowercase().as_str() {
            "orange" => BadgeColor::Orange,
            "yellow" => BadgeColor::Yellow,
            "green" => BadgeColor::Green,
            "blue" => BadgeColor::Blue,
            "purple" => BadgeColor::Purple,
            "gray" => BadgeColor::Gray,
            _ => BadgeColor::Red,
        }
    }

    pub fn rgba(self) -> [u8; 4] {
        match self {
            BadgeColor::Red => [217, 48, 37, 255],
            BadgeColor::Orange => [255, 152, 0, 255],
            BadgeColor::Yellow => [251, 188, 5, 255],
            BadgeColor::Green => [52, 168, 83, 255],
            BadgeColor::Blue => [66, 133, 244, 255],
            BadgeColor::Purple => [156, 39, 176, 255],
            BadgeColor::Gray => BadgeColor::NEUTRAL,
        }
    }
}

impl From<String> for BadgeColor {
    fn from(name: String) -> BadgeColor {
        BadgeColor::from_name(&name)
    }
}

/// UI language override. `auto` follows the browser locale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    Auto,
    Locale(String),
}

impl From<String> for Language {
    fn from(code: String) -> Language {
        if code.is_empty() || code.eq_ignore_ascii_case("auto") {
            Language::Auto
        } else {
            Language::Locale(code)
        }
    }
}

impl From<Language> for String {
    fn from(language: Language) -> String {
        match language {
            Language::Auto => "auto".to_string(),
            Language::Locale(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_close: bool,
    pub current_window_only: bool,
    pub sort_tabs: bool,
    pub badge_color: BadgeColor,
    pub language: Language,
    /// Show the total tab count on the badge when there are no duplicates
    pub show_tab_count: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            auto_close: false,
            current_window_only: false,
            sort_tabs: false,
            badge_color: BadgeColor::default(),
            language: Language::default(),
            show_tab_count: true,
        }
    }
}

impl Settings {
    /// Build settings from a storage read, key by key.
    ///
    /// Missing or unreadable keys take their default, so a corrupt entry only
    /// loses itself.
    pub fn from_stored(value: &Value) -> Settings {
        let defaults = Settings::default();
        let Some(items) = value.as_object() else {
            if !value.is_null() {
                log::warn!("Ignoring stored settings that are not an object: {}", value);
            }
            return defaults;
        };

        Settings {
            auto_close: read_key(items, "autoClose", defaults.auto_close),
            current_window_only: read_key(items, "currentWindowOnly", defaults.current_window_only),
            sort_tabs: read_key(items, "sortTabs", defaults.sort_tabs),
            badge_color: read_key(items, "badgeColor", defaults.badge_color),
            language: read_key(items, "language", defaults.language),
            show_tab_count: read_key(items, "showTabCount", defaults.show_tab_count),
        }
    }

    pub fn summary(&self) -> SettingsSummary {
        SettingsSummary {
            auto_close: self.auto_close,
            current_window_only: self.current_window_only,
            sort_tabs: self.sort_tabs,
        }
    }
}

fn read_key<T: DeserializeOwned>(items: &Map<String, Value>, key: &str, default: T) -> T {
    match items.get(key) {
        None | Some(Value::Null) => default,
        Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
            log::warn!("Setting {} has an unusable value {}: {}", key, raw, e);
            default
        }),
    }
}

/// Settings echoed back to the popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSummary {
    pub auto_close: bool,
    pub current_window_only: bool,
    pub sort_tabs: bool,
}

/// Partial settings write; unset fields are left alone in storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_close: Option<bool>,
}

impl SettingsPatch {
    pub fn auto_close(enabled: bool) -> SettingsPatch {
        SettingsPatch {
            auto_close: Some(enabled),
        }
    }

    pub fn apply(&self, settings: &mut Settings) {
        if let Some(auto_close) = self.auto_close {
            settings.auto_close = auto_close;
        }
    }
}
