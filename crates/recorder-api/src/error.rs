//! Error type for the recorder API client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS or timeout failure before a status was received.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    /// Server answered with a non-success status.
    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    /// Session is missing or expired (401/403).
    #[error("unauthorized ({code}): {message}")]
    Unauthorized { code: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("decode {what} response: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A required capability is not available in this environment.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ApiError {
    /// HTTP status attached to the error, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } | ApiError::Unauthorized { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Text the server sent with a failing status.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } | ApiError::Unauthorized { message, .. } => {
                Some(message.as_str())
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub(crate) fn transport(url: &str, source: ureq::Error) -> Self {
        ApiError::Transport {
            url: url.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn from_status(code: u16, body: &str) -> Self {
        let message = status_message(code, body);
        if code == 401 || code == 403 {
            ApiError::Unauthorized { code, message }
        } else {
            ApiError::Status { code, message }
        }
    }
}

/// Server text when present, otherwise `HTTP <code>`.
pub(crate) fn status_message(code: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {code}");
    }
    let snippet: String = trimmed.chars().take(500).collect();
    if trimmed.chars().count() > 500 {
        format!("{snippet}...")
    } else {
        snippet
    }
}
