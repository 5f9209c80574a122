use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Collects per-record diagnostics into one `; `-separated message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorAccumulator(Option<String>);

impl ErrorAccumulator {
    pub fn push(&mut self, msg: &str) {
        match &mut self.0 {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(msg);
            }
            None => {
                self.0 = Some(msg.to_string());
            }
        }
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// A game value that cannot be turned into a [`GameRecord`](super::GameRecord).
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid game record: expected a JSON object, found {found}")]
    InvalidRecord { found: &'static str },

    #[error("invalid game record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of a game source (remote API or local export files).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("could not decode game at {origin}:{line}: {source}")]
    Decode {
        origin: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SourceError {
    /// Whether the whole sequence should stop. Decode failures and bad
    /// input only affect the record they were raised for.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Network(_) | Self::Io { .. })
    }
}

impl SourceError {
    /// Classifies a failed HTTP exchange; rejected credentials are `Auth`.
    fn from_http(status: Option<StatusCode>, message: String) -> Self {
        match status {
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Self::Auth(message),
            _ => Self::Network(message),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_http(err.status(), err.to_string())
    }
}

/// Failures of the commentary (chat completion) service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("commentary service rate limit reached: {0}")]
    RateLimited(String),

    #[error("commentary service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("commentary service unreachable: {0}")]
    Network(String),

    #[error("commentary service sent an unreadable response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("commentary service returned no content")]
    EmptyResponse,
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    InvalidVar { name: &'static str, value: String },
}

/// Failure of a single item in a batch; the batch itself keeps going.
#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("game {id}: {source}")]
    Record {
        id: String,
        #[source]
        source: RecordError,
    },
}
