//! Error types for synchronization and fetch operations.
//!
//! `SyncError` is the single error surfaced by the crate. Remote call failures
//! carry a structured `CallError` so callers can show the server's own
//! message instead of a bare status code.

use crate::api::ApiResponse;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0}")]
    Call(#[from] CallError),

    #[error("No attributes found for {0}")]
    NoAttributes(String),

    #[error("Cannot find parent {kind} attributes for {kind} {path}")]
    ParentAttributesNotFound { kind: &'static str, path: String },

    #[error("No connection is registered to reach {0}")]
    NoRequesters(String),

    #[error("Process cancelled")]
    Cancelled,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Cancellation is not a failure and must not be reported as one.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// Message suitable for direct display.
    ///
    /// Call errors prefer the first server-provided detail line, with the
    /// z/OS message identifier stripped.
    pub fn display_message(&self) -> String {
        match self {
            SyncError::Call(call) => {
                let raw = call
                    .first_detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| call.to_string());
                separate_error_message(&raw.replace('\n', " ")).description
            }
            other => other.to_string().replace('\n', " "),
        }
    }
}

// =============================================================================
// CallError
// =============================================================================

/// Error parameters z/OSMF returns in the JSON body of a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorParams {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub rc: Option<i64>,
    #[serde(default)]
    pub reason: Option<i64>,
}

/// A remote call that completed with a non-success status.
#[derive(Error, Debug, Clone)]
#[error("{head_message}: {status} {reason}{}", params_suffix(.error_params))]
pub struct CallError {
    pub status: u16,
    pub reason: String,
    pub head_message: String,
    pub error_body: Option<String>,
    pub error_params: Option<ErrorParams>,
}

impl CallError {
    pub fn new(status: u16, reason: impl Into<String>, head_message: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            head_message: head_message.into(),
            error_body: None,
            error_params: None,
        }
    }

    /// Build from a failed response, decoding the JSON error body if present.
    pub fn from_response<T>(response: &ApiResponse<T>, head_message: impl Into<String>) -> Self {
        let error_params = response
            .error_body
            .as_deref()
            .and_then(|body| serde_json::from_str::<ErrorParams>(body).ok());
        Self {
            status: response.status,
            reason: response.reason.clone(),
            head_message: head_message.into(),
            error_body: response.error_body.clone(),
            error_params,
        }
    }

    pub fn first_detail(&self) -> Option<&str> {
        self.error_params
            .as_ref()
            .and_then(|p| p.details.first())
            .map(String::as_str)
    }
}

fn params_suffix(params: &Option<ErrorParams>) -> String {
    match params.as_ref().and_then(|p| p.message.as_deref()) {
        Some(message) => format!(" ({message})"),
        None => String::new(),
    }
}

/// Friendlier head messages for common HTTP reason phrases.
pub fn response_message_map(reason: &str) -> Option<&'static str> {
    match reason {
        "Unauthorized" => Some("Credentials are not valid"),
        "Not Found" => Some("Endpoint not found"),
        "Forbidden" => Some("Access forbidden"),
        "Internal Server Error" => Some("Internal server error"),
        "Bad Request" => Some("Bad request"),
        _ => None,
    }
}

// =============================================================================
// Message separation
// =============================================================================

/// A z/OS diagnostic split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorParts {
    pub code: Option<String>,
    pub description: String,
}

fn message_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // e.g. "EDC5129I", "IKJ56228I", "DMS2987E"
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Z]{3,4}\d{3,5}[A-Z])\s+(.*)$").expect("message id pattern is valid")
    })
}

/// Split a leading z/OS message id from the human-readable text.
pub fn separate_error_message(message: &str) -> ErrorParts {
    match message_id_regex().captures(message) {
        Some(caps) => ErrorParts {
            code: caps.get(1).map(|m| m.as_str().to_string()),
            description: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        },
        None => ErrorParts {
            code: None,
            description: message.trim().to_string(),
        },
    }
}
