use crate::pickle::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Malformed batch element {index}: {reason}")]
    MalformedBatchElement { index: usize, reason: String },

    #[error("Invalid value {token:?} for {field}")]
    InvalidNumber { field: &'static str, token: String },

    #[error("Unexpected end of stream after {tokens} of 3 tokens")]
    UnexpectedEof { tokens: usize },

    #[error("Token exceeds {limit} bytes")]
    TokenTooLong { limit: usize },

    #[error("Batch frame of {length} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { length: usize, limit: usize },

    #[error("Invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Unknown index driver: {0}")]
    UnknownDriver(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

impl QuarryError {
    /// Creates a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a new index backend error
    pub fn index<S: Into<String>>(msg: S) -> Self {
        Self::Index(msg.into())
    }

    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a malformed batch element error
    pub fn malformed<S: Into<String>>(index: usize, reason: S) -> Self {
        Self::MalformedBatchElement {
            index,
            reason: reason.into(),
        }
    }

    /// Creates an invalid glob pattern error
    pub fn pattern<P: Into<String>, S: Into<String>>(pattern: P, reason: S) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Timeout { .. } => true,
            Self::Http(err) => {
                err.is_connect()
                    || err.is_timeout()
                    || err.status().map_or(false, |s| s.is_server_error())
            },
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Protocol(_)
            | Self::InvalidNumber { .. }
            | Self::UnexpectedEof { .. }
            | Self::TokenTooLong { .. }
            | Self::FrameTooLarge { .. } => "protocol",
            Self::Decode(_) | Self::MalformedBatchElement { .. } => "decode",
            Self::InvalidPattern { .. } => "query",
            Self::Index(_) | Self::UnknownDriver(_) => "index",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Http(_) | Self::Network(_) => "network",
            Self::Join(_) => "async",
            Self::Timeout { .. } => "timeout",
        }
    }
}
