//! Error types for the Speechbox peripheral core.


/// Result type alias for Speechbox operations
pub type SpeechResult<T> = Result<T, SpeechError>;

/// Main error type for speech device operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    /// A speech request is already locked or streaming
    #[error("already processing")]
    AlreadyProcessing,

    /// The requested text exceeds the configured maximum length
    #[error("text too long")]
    TextTooLong,

    /// No text-to-speech provider is attached to the device
    #[error("text-to-speech system not available")]
    ProviderUnavailable,

    /// Stop was requested while the device was idle
    #[error("not talking")]
    NotTalking,

    /// The provider failed to synthesize the requested text
    #[error("speech synthesis failed: {message}")]
    Synthesis {
        /// Error message describing the provider failure
        message: String,
    },

    /// Persisted configuration could not be read or written
    #[error("persistence error: {message}")]
    Persistence {
        /// Error message describing the persistence failure
        message: String,
    },

    /// Device configuration is invalid
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl SpeechError {
    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::Synthesis {
            message: message.into(),
        }
    }

    /// Create a new persistence error
    #[must_use]
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error reflects a caller mistake (wrong state or input)
    /// rather than a device or provider fault
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyProcessing
                | Self::TextTooLong
                | Self::NotTalking
                | Self::Configuration { .. }
        )
    }

    /// Get the error category for logging/metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::AlreadyProcessing => "busy",
            Self::TextTooLong => "input",
            Self::ProviderUnavailable => "provider",
            Self::NotTalking => "idle",
            Self::Synthesis { .. } => "synthesis",
            Self::Persistence { .. } => "persistence",
            Self::Configuration { .. } => "configuration",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for SpeechError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SpeechError {
    fn from(err: serde_json::Error) -> Self {
        Self::persistence(format!("JSON serialization error: {err}"))
    }
}
