//! Error types for collaborator failures

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to acquire a raw metric value from the host
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparsable {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("network interface {0} not found")]
    MissingInterface(String),
}

impl SourceError {
    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        SourceError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

/// Failure of a single bandwidth measurement attempt
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("bandwidth test `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("bandwidth test timed out after {0:?}")]
    Timeout(Duration),

    #[error("unparsable bandwidth test output: {0}")]
    Parse(String),
}

/// Failure to deliver a notification to one recipient
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("endpoint {0} cannot take path segments")]
    NotABase(String),
}
