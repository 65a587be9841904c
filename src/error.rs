//! Story context error types

use thiserror::Error;

/// Story context error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote vector backend fault (network, timeout, backend-side failure)
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Requested story context does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A structural invariant was violated; always a defect
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Text generation collaborator failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

}

/// Result type alias for story context operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            Error::NotFound("story1".to_string()).to_string(),
            "Not found: story1"
        );
        assert_eq!(
            Error::VectorStore("timed out".to_string()).to_string(),
            "Vector store error: timed out"
        );
    }
}
