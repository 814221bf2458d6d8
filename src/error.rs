//! Error types for clocktune.
//!
//! Only configuration-class errors are fatal. Transport and parse failures
//! during a batch are folded into invalid predictions by the reader, and
//! rewrite failures into optimization records by the loop; they still use
//! these variants on the way there.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API credential was supplied
    #[error("Missing API key: pass --api-key or set OPENAI_API_KEY")]
    MissingCredential,

    /// Dataset missing or malformed
    #[error("Dataset error at {}: {reason}", path.display())]
    Dataset { path: PathBuf, reason: String },

    /// Network or API failure talking to the model
    #[error("Transport error: {0}")]
    Transport(String),

    /// Model output could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Predictions and truths are paired by position
    #[error("Cannot pair {predictions} predictions with {truths} samples")]
    LengthMismatch { predictions: usize, truths: usize },

    /// Prompt rewriting failed
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn dataset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Dataset {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors that must stop the run before any processing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::MissingCredential | Error::Dataset { .. } | Error::Toml(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::MissingCredential.is_fatal());
        assert!(Error::dataset("dataset/metadata.json", "not found").is_fatal());
        assert!(!Error::Transport("timeout".into()).is_fatal());
        assert!(!Error::Rewrite("quota".into()).is_fatal());
        assert!(!Error::LengthMismatch { predictions: 1, truths: 2 }.is_fatal());
    }

    #[test]
    fn test_dataset_message() {
        let err = Error::dataset("dataset/metadata.json", "hour 25 out of range");
        assert_eq!(
            err.to_string(),
            "Dataset error at dataset/metadata.json: hour 25 out of range"
        );
    }
}
