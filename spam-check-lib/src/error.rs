//! Error handling for the spam report pipeline.
//!
//! The pipeline itself never returns an error: every failure inside a stage is
//! logged and the affected item is dropped. This type describes those failures
//! for the external service seams, configuration loading and input parsing.

use std::fmt;

/// Main error type for spam check operations.
///
/// This enum covers the failure modes of the external collaborators
/// (user lookup, message lookup, spam classification) as well as
/// configuration and input problems surfaced to the CLI.
#[derive(Debug, Clone)]
pub enum SpamCheckError {
    /// Identifier could not be interpreted (empty, whitespace only, etc.)
    InvalidIdentifier {
        identifier: String,
        reason: String,
    },

    /// User lookup service failed for an identifier
    UserLookup {
        identifier: String,
        message: String,
    },

    /// Batched message lookup failed
    MessageLookup {
        batch_size: usize,
        message: String,
    },

    /// Spam classification failed for a single message
    Classification {
        message_id: u64,
        message: String,
    },

    /// A batch exceeded what the message service accepts
    BatchTooLarge {
        size: usize,
        limit: usize,
    },

    /// Too many concurrent requests hit a rate-limited service
    RateLimited {
        service: String,
        limit: usize,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading identifier lists, fixtures or config
    FileError {
        path: String,
        message: String,
    },

    /// JSON or TOML parsing errors
    ParseError {
        message: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl SpamCheckError {
    /// Create a new invalid identifier error.
    pub fn invalid_identifier<I: Into<String>, R: Into<String>>(identifier: I, reason: R) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a new user lookup error.
    pub fn user_lookup<I: Into<String>, M: Into<String>>(identifier: I, message: M) -> Self {
        Self::UserLookup {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Create a new message lookup error.
    pub fn message_lookup<M: Into<String>>(batch_size: usize, message: M) -> Self {
        Self::MessageLookup {
            batch_size,
            message: message.into(),
        }
    }

    /// Create a new classification error.
    pub fn classification<M: Into<String>>(message_id: u64, message: M) -> Self {
        Self::Classification {
            message_id,
            message: message.into(),
        }
    }

    /// Create a new rate limit error.
    pub fn rate_limited<S: Into<String>>(service: S, limit: usize) -> Self {
        Self::RateLimited {
            service: service.into(),
            limit,
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error suggests the call could succeed if retried.
    ///
    /// The pipeline never retries on its own; callers that need a complete
    /// report can use this to build a retry wrapper around a service.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::UserLookup { .. }
                | Self::MessageLookup { .. }
                | Self::Classification { .. }
        )
    }
}

impl fmt::Display for SpamCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier { identifier, reason } => {
                write!(f, "Invalid identifier '{}': {}", identifier, reason)
            }
            Self::UserLookup {
                identifier,
                message,
            } => {
                write!(f, "User lookup failed for '{}': {}", identifier, message)
            }
            Self::MessageLookup {
                batch_size,
                message,
            } => {
                write!(
                    f,
                    "Message lookup failed for batch of {} users: {}",
                    batch_size, message
                )
            }
            Self::Classification {
                message_id,
                message,
            } => {
                write!(f, "Spam check failed for message {}: {}", message_id, message)
            }
            Self::BatchTooLarge { size, limit } => {
                write!(f, "Batch of {} users exceeds limit of {}", size, limit)
            }
            Self::RateLimited { service, limit } => {
                write!(
                    f,
                    "Rate limited by {}: more than {} concurrent requests",
                    service, limit
                )
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::ParseError { message } => {
                write!(f, "Parse error: {}", message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SpamCheckError {}

// Implement From conversions for common error types
impl From<serde_json::Error> for SpamCheckError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON parsing failed: {}", err),
        }
    }
}

impl From<toml::de::Error> for SpamCheckError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}

impl From<std::io::Error> for SpamCheckError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}
