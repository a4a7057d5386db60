//! Shared error types for the services crate.

use thiserror::Error;

use speak_core::model::FormError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `BackendClient` and the API traits.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("backend responded with status {status}")]
    Status {
        status: reqwest::StatusCode,
        message: Option<String>,
    },
    #[error("backend returned an invalid body: {0}")]
    InvalidBody(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            Self::InvalidBody(_) => None,
        }
    }

    /// Server-provided `message` field, if the error body carried one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref(),
            Self::Http(_) | Self::InvalidBody(_) => None,
        }
    }
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} is not a valid URL: {raw}")]
    InvalidUrl { var: &'static str, raw: String },
    #[error("{var} must be a whole number of milliseconds, got {raw:?}")]
    InvalidMillis { var: &'static str, raw: String },
}

/// Errors emitted by `ProgressStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AuthService`.
///
/// `Display` is the message shown to the user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("{message}")]
    Rejected {
        status: Option<reqwest::StatusCode>,
        message: String,
    },
    #[error(
        "This email address is already registered. Please use a different email or try signing in."
    )]
    EmailTaken,
    #[error("Server returned an invalid response. Please try again.")]
    InvalidResponse,
    #[error("Request timed out. The server might be down or overloaded.")]
    Timeout,
    #[error("Request was cancelled.")]
    Cancelled,
    #[error("Cannot connect to server. Please check your internet connection.")]
    Network(#[source] reqwest::Error),
    #[error("Please sign in first.")]
    NotSignedIn,
    #[error("Unexpected error: {0}")]
    Internal(String),
    #[error("Error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Message suitable for an error banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Errors emitted by the evaluation seam.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvaluationError {
    #[error("evaluation service unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `RecordingService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordingError {
    #[error("sign in to keep recordings")]
    NotSignedIn,
    #[error("no recording at position {index}")]
    NoSuchRecording { index: usize },
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `RankingService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RankingError {
    #[error("Failed to fetch ranking data.")]
    Fetch(#[from] ApiError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
