//! Error types for tts-bridge
//!
//! Every failure of the synthesis pipeline is reported as a [`TtsBridgeError`].
//! [`TtsBridgeError::kind`] gives the flat discriminant used by callers and by the
//! retry loop.

use std::fmt;
use thiserror::Error;

/// Maximum number of characters of a provider body kept in an error.
const SNIPPET_LEN: usize = 256;

/// Which side of a numeric range was violated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Value was below the inclusive minimum
    Min(f64),
    /// Value was above the inclusive maximum
    Max(f64),
    /// Value was required but missing or blank
    Required,
    /// Value was NaN or infinite
    Finite,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Min(min) => write!(f, "must not be less than {}", min),
            Bound::Max(max) => write!(f, "must not be greater than {}", max),
            Bound::Required => write!(f, "must not be empty"),
            Bound::Finite => write!(f, "must be a finite number"),
        }
    }
}

/// Flat classification of [`TtsBridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Transport,
    HttpStatus,
    MalformedResponse,
    MissingAudio,
    Download,
    Io,
    Dispatch,
    Configuration,
}

/// Errors of the tts-bridge pipeline
#[derive(Debug, Error)]
pub enum TtsBridgeError {
    /// A caller-supplied parameter is out of range or missing
    #[error("Invalid parameter `{parameter}`: {bound} (got {value})")]
    Validation {
        parameter: String,
        bound: Bound,
        value: String,
    },

    /// Connection refused, DNS failure or timeout on the synthesis call
    #[error("TTS service connection failed: {cause}")]
    Transport { cause: String },

    /// The provider answered with a non-2xx status
    #[error("TTS service returned error: {status_code}")]
    HttpStatus { status_code: u16, body: String },

    /// The provider answered 2xx with a body that is not the expected JSON
    #[error("TTS service returned a malformed response: {raw_body}")]
    MalformedResponse { raw_body: String },

    /// The provider response carries neither an audio URL nor inline audio
    #[error("TTS service returned no audio{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    MissingAudio { message: Option<String> },

    /// Fetching the audio from the returned URL failed
    #[error("Audio download failed: {cause}")]
    Download { cause: String },

    /// Local filesystem failure while handling the audio
    #[error("Audio file processing failed: {0}")]
    Io(#[from] std::io::Error),

    /// Push-mode delivery failed
    #[error("Audio dispatch failed: {cause}")]
    Dispatch { cause: String },

    /// Loading, parsing or saving the provider configuration failed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TtsBridgeError {
    pub fn validation(parameter: impl Into<String>, bound: Bound, value: impl fmt::Display) -> Self {
        TtsBridgeError::Validation {
            parameter: parameter.into(),
            bound,
            value: value.to_string(),
        }
    }

    pub fn http_status(status_code: u16, body: &str) -> Self {
        TtsBridgeError::HttpStatus {
            status_code,
            body: snippet(body),
        }
    }

    pub fn malformed(raw_body: &str) -> Self {
        TtsBridgeError::MalformedResponse {
            raw_body: snippet(raw_body),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TtsBridgeError::Validation { .. } => ErrorKind::Validation,
            TtsBridgeError::Transport { .. } => ErrorKind::Transport,
            TtsBridgeError::HttpStatus { .. } => ErrorKind::HttpStatus,
            TtsBridgeError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            TtsBridgeError::MissingAudio { .. } => ErrorKind::MissingAudio,
            TtsBridgeError::Download { .. } => ErrorKind::Download,
            TtsBridgeError::Io(_) => ErrorKind::Io,
            TtsBridgeError::Dispatch { .. } => ErrorKind::Dispatch,
            TtsBridgeError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Environment or provider faults that a later attempt may not hit again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::HttpStatus | ErrorKind::Download
        )
    }
}

impl From<serde_json::Error> for TtsBridgeError {
    fn from(err: serde_json::Error) -> Self {
        TtsBridgeError::Configuration(err.to_string())
    }
}

/// Truncate a provider body for logs and error payloads
pub(crate) fn snippet(body: &str) -> String {
    if body.chars().count() <= SNIPPET_LEN {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(SNIPPET_LEN).collect();
    cut.push('…');
    cut
}

/// Result type of tts-bridge
pub type Result<T> = std::result::Result<T, TtsBridgeError>;
