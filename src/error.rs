use thiserror::Error;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dictionary entry cap reached ({0} entries)")]
    EntryCapExceeded(usize),

    #[error("Location array at capacity ceiling ({0} entries)")]
    LocationCapExceeded(usize),

    #[error("Output error for {path}: {source}")]
    Output {
        path: String,
        source: std::io::Error,
    },

    #[error("Worker thread panicked")]
    WorkerPanic,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for indexing operations
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Check if this error must abort the current file rather than degrade
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IndexError::LocationCapExceeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::EntryCapExceeded(10_000_000);
        assert_eq!(
            err.to_string(),
            "Dictionary entry cap reached (10000000 entries)"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(IndexError::EntryCapExceeded(1).is_fatal());
        assert!(IndexError::WorkerPanic.is_fatal());
        assert!(!IndexError::LocationCapExceeded(1).is_fatal());
    }
}
