//! Error types for the channel reaper.

use std::path::PathBuf;

/// Configuration-related errors. All of these are fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to parse {}: {reason}", path.display())]
    ParseError { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the messaging platform collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("Slack {method} request failed: {reason}")]
    RequestFailed { method: String, reason: String },

    #[error("Slack {method} returned error: {error}")]
    Api { method: String, error: String },

    #[error("Invalid response from Slack {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Missing token for Slack {method}")]
    MissingToken { method: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlackError {
    /// Slack's error code, when the API itself rejected the call.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Tabular source/sink errors.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column {column} in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
