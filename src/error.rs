use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failure of a single cross-window RPC call.
///
/// Messages from other origins or with other correlation ids are not errors;
/// they never reach the caller.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("Request to {origin} timed out")]
    Timeout { origin: String },

    #[error("RPC reply had no result or error")]
    MalformedReply,

    /// The `error` member of the reply, passed through untouched.
    #[error("RPC call failed: {0}")]
    Remote(Value),

    #[error("Failed to post RPC request: {0}")]
    Post(String),
}

/// Structured failure reported by the listing backend.
///
/// Mirrors the JSON error body `{message?, details?, error_code?}` the backend
/// returns for non-2xx responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: Option<u16>) -> Self {
        Self {
            status,
            error_message: None,
            error_code: None,
            details: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Server-supplied human-readable message, ignoring blank strings.
    pub fn server_message(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.server_message().unwrap_or("API call failed"))
    }
}

impl std::error::Error for ApiError {}

/// Failure of a listing call.
#[derive(Debug, Clone, Error)]
pub enum ListingError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Network, decoding or any other non-API failure.
    #[error("{0}")]
    Transport(String),
}

impl ListingError {
    /// Whether this failure means "the user must authorize first".
    ///
    /// The backend signals a missing or expired LMS token with an error body
    /// that carries no message. Anything with a message, and any failure that
    /// never reached the backend, is a real error to show the user.
    pub fn requires_authorization(&self) -> bool {
        match self {
            ListingError::Api(api) => api.server_message().is_none(),
            ListingError::Transport(_) => false,
        }
    }

    /// Underlying detail shown under the summary message.
    pub fn detail(&self) -> String {
        match self {
            ListingError::Api(api) => {
                let mut detail = api.to_string();
                if let Some(code) = &api.error_code {
                    detail.push_str(&format!(" ({code})"));
                }
                if let Some(details) = api.details.as_ref().filter(|value| !value.is_null()) {
                    detail.push_str(&format!(": {details}"));
                }
                detail
            }
            ListingError::Transport(message) => message.clone(),
        }
    }
}

impl From<reqwest::Error> for ListingError {
    fn from(error: reqwest::Error) -> Self {
        ListingError::Transport(error.to_string())
    }
}

/// Failure of an authorization session.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Failed to open authorization window: {0}")]
    Open(String),

    #[error("Authorization window was closed before authorization completed")]
    WindowClosed,

    #[error("Authorization timed out")]
    TimedOut,

    #[error("Authorization was cancelled")]
    Cancelled,

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Failure loading picker settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid URL in settings: {0}")]
    Url(#[from] url::ParseError),
}
