use std::path::PathBuf;

use thiserror::Error;

/// A single page fetch failed (transport, quota, not found, timeout).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", describe(.status, .message))]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("request failed: {}", message),
    }
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        RemoteError {
            status,
            message: message.into(),
        }
    }

    /// Map a reqwest error, dropping the URL so the API key never lands in logs.
    pub fn transport(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        RemoteError::new(status, err.without_url().to_string())
    }
}

/// Failure that ends pagination for one identifier. Never escapes the collector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("pagination exhausted after {fetches} fetches ({collected} of {cap} comments)")]
    PaginationExhausted {
        fetches: usize,
        collected: usize,
        cap: usize,
    },
}

/// One raw entry in a page could not be turned into a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("skipped entry {index} for {identifier}: {reason}")]
pub struct EntryExtractionWarning {
    pub identifier: String,
    pub index: usize,
    pub reason: String,
}

/// Aborts the whole run before any identifier is processed.
#[derive(Debug, Error)]
pub enum BatchSetupError {
    #[error("identifier source not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("failed to read identifier source {}: {message}", .path.display())]
    UnreadableSource { path: PathBuf, message: String },

    #[error("identifier source {} has no video_id column", .0.display())]
    MissingColumn(PathBuf),

    #[error("output directory {} is not writable: {source}", .path.display())]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open store {}: {message}", .path.display())]
    Store { path: PathBuf, message: String },

    #[error("missing API key: set YOUTUBE_API_KEY or YT_API_KEY")]
    MissingApiKey,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display() {
        let e = RemoteError::new(Some(403), "quotaExceeded");
        assert_eq!(e.to_string(), "HTTP 403: quotaExceeded");
        let e = RemoteError::new(None, "operation timed out");
        assert_eq!(e.to_string(), "request failed: operation timed out");
    }

    #[test]
    fn collect_error_is_transparent_over_remote() {
        let e: CollectError = RemoteError::new(Some(404), "videoNotFound").into();
        assert_eq!(e.to_string(), "HTTP 404: videoNotFound");
    }
}
