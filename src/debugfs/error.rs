use std::time::Duration;
use thiserror::Error;

/// Failures of an interactive editing-shell session.
///
/// Every variant is fatal for the session that produced it. The image being
/// edited is left as the shell last wrote it.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}s waiting for {marker:?}; output so far: {partial:?}", .timeout.as_secs())]
    Timeout {
        marker: String,
        timeout: Duration,
        partial: String,
    },

    #[error("shell output ended while waiting for {marker:?}; output so far: {partial:?}")]
    Closed { marker: String, partial: String },

    #[error("shell rejected '{command}': {}", .response.trim())]
    Rejected { command: String, response: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
