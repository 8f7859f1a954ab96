//! Error handling for the accident detector

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config error (missing file section, invalid range)
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Network error (connection refused, retries exhausted)
    #[error("Network error: {0}")]
    Network(String),

    /// Remote API returned an unusable response
    #[error("API error: {0}")]
    Api(String),

    /// Frame source could not be opened or read
    #[error("Camera error: {0}")]
    Camera(String),

    /// Classifier unavailable or prediction failed
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Persisted state could not be written
    #[error("State error: {0}")]
    State(String),

    /// Operation aborted by shutdown
    #[error("Cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::Config("frame_queue_size must be >= 1".to_string()).to_string(),
            "Config error: frame_queue_size must be >= 1"
        );
        assert_eq!(Error::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
