//! Error types for the transcoder.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Errors that can occur while reconciling or converting files.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// Required services, paths or tools are missing. Aborts before any pass runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No file could be found for an identifier.
    #[error("no file found for {hash}")]
    NotFound { hash: String },

    /// More than one match where exactly one was expected.
    #[error("expected one match for {hash}, found {}: {matches:?}", matches.len())]
    LookupAmbiguity { hash: String, matches: Vec<String> },

    /// An external encoder or prober exited with a failure status.
    #[error("{tool} failed (exit code {exit_code}) on {}: {stderr}", path.display())]
    EncoderFailure {
        tool: String,
        path: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    /// Prober output could not be interpreted.
    #[error("failed to probe {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    /// The store refused or failed to delete a file.
    #[error("failed to delete {hash}: {message}")]
    DeletionFailure { hash: String, message: String },

    /// A store request failed.
    #[error("store error: {0}")]
    Store(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a deletion failure from any displayable cause.
    pub fn deletion(hash: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::DeletionFailure {
            hash: hash.into(),
            message: cause.to_string(),
        }
    }

    /// Create a store error from any displayable cause.
    pub fn store(cause: impl std::fmt::Display) -> Self {
        Self::Store(cause.to_string())
    }

    /// Short machine-friendly name of the error kind, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::NotFound { .. } => "not-found",
            Self::LookupAmbiguity { .. } => "lookup-ambiguity",
            Self::EncoderFailure { .. } => "encoder-failure",
            Self::Probe { .. } => "probe",
            Self::DeletionFailure { .. } => "deletion-failure",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
        }
    }
}

/// A failure attached to one file, collected into pass reports.
#[derive(Debug)]
pub struct ItemError {
    pub hash: String,
    pub error: TranscodeError,
}

impl ItemError {
    pub fn new(hash: impl Into<String>, error: TranscodeError) -> Self {
        Self {
            hash: hash.into(),
            error,
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.hash, self.error.kind(), self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguity_message_lists_matches() {
        let err = TranscodeError::LookupAmbiguity {
            hash: "ab12".to_string(),
            matches: vec!["/data/fab/ab12.jpg".to_string(), "/data/fab/ab12.png".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("found 2"));
        assert!(msg.contains("ab12.png"));
        assert_eq!(err.kind(), "lookup-ambiguity");
    }

    #[test]
    fn test_item_error_display() {
        let item = ItemError::new("cafe", TranscodeError::deletion("cafe", "HTTP 403"));
        assert_eq!(item.to_string(), "cafe [deletion-failure]: failed to delete cafe: HTTP 403");
    }
}
