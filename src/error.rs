/// Error types for the duplicate-tab agent
///
/// Nothing here is fatal. Host failures skip the current cycle, config failures
/// fall back to defaults, and normalisation failures never leave `suspender`.
use thiserror::Error;

/// Failures surfaced while talking to the browser or handling a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// A chrome.* capability call failed (tab gone, permission denied, ...)
    #[error("{operation} failed: {message}")]
    HostApi { operation: String, message: String },

    /// Settings could not be read or parsed
    #[error("failed to load settings: {0}")]
    ConfigLoad(String),

    /// An inbound runtime message could not be understood
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl AgentError {
    pub fn host(operation: impl Into<String>, message: impl Into<String>) -> AgentError {
        AgentError::HostApi {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Reasons a URL could not be unwrapped from a suspender page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("not a suspended-tab URL")]
    NotSuspended,

    #[error("suspended-tab URL has no uri parameter")]
    MissingUri,

    #[error("suspended-tab URL has an empty uri parameter")]
    EmptyUri,

    #[error("suspended-tab uri is not valid UTF-8: {0}")]
    MalformedUri(String),

    #[error("malformed suspender URL: {0}")]
    MalformedUrl(String),
}
