/// Runtime messages exchanged with the popup and options pages
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::counts::{Counts, DomainCount, DuplicateEntry};
use crate::error::AgentError;
use crate::settings::SettingsSummary;

/// Requests the UI surfaces send to the background agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    CloseDuplicates,
    SetAutoClose {
        #[serde(default, deserialize_with = "truthy")]
        value: bool,
    },
    GetCounts,
}

impl Request {
    pub fn from_value(message: &Value) -> Result<Request, AgentError> {
        serde_json::from_value(message.clone()).map_err(|e| AgentError::InvalidMessage(e.to_string()))
    }
}

/// JS truthiness: `1`, `"yes"` and objects are true; `0`, `""` and `null` are false
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// Payload of a `GET_COUNTS` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsReport {
    pub total_tabs: usize,
    pub duplicates: usize,
    pub duplicates_closeable: usize,
    pub unique_urls: usize,
    pub top_domains: Vec<DomainCount>,
    pub duplicates_list: Vec<DuplicateEntry>,
    pub settings: SettingsSummary,
}

impl CountsReport {
    pub fn new(counts: Counts, settings: SettingsSummary) -> CountsReport {
        CountsReport {
            total_tabs: counts.total_tabs,
            duplicates: counts.duplicate_count,
            duplicates_closeable: counts.duplicate_closeable_count,
            unique_urls: counts.unique_urls,
            top_domains: counts.top_domains,
            duplicates_list: counts.duplicates_list,
            settings,
        }
    }
}

/// `{ ok: true, ...payload }` or `{ ok: false, error }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub counts: Option<CountsReport>,
}

impl Response {
    pub fn ok() -> Response {
        Response {
            ok: true,
            error: None,
            counts: None,
        }
    }

    pub fn with_counts(report: CountsReport) -> Response {
        Response {
            ok: true,
            error: None,
            counts: Some(report),
        }
    }

    pub fn failed(error: &AgentError) -> Response {
        Response {
            ok: false,
            error: Some(error.to_string()),
            counts: None,
        }
    }
}
