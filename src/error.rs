//! Error types for keyspace-analyzer
//!
//! This module defines the error hierarchy for:
//! - Store connection and command errors
//! - Configuration and CLI errors
//! - Pipeline stage errors
//! - Session/query errors raised by the presentation layer
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the target, stage or key involved
//! - Preserve error chains for debugging

use thiserror::Error;

/// Top-level error type for the analyzer
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Server errors
    #[cfg(feature = "server")]
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Store connection and command errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Dial or authentication failed
    #[error("Failed to connect to '{target}': {reason}")]
    ConnectionFailed { target: String, reason: String },

    /// A command or pipeline failed on the wire or was rejected by the server
    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    /// The server answered with something the caller cannot decode
    #[error("Unexpected reply to {command}: {reason}")]
    UnexpectedReply { command: String, reason: String },
}

impl StoreError {
    /// Build a `Command` error from any displayable cause
    pub fn command(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StoreError::Command {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an `UnexpectedReply` error from any displayable cause
    pub fn unexpected(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StoreError::UnexpectedReply {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error happened before any command was sent
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::ConnectionFailed { .. })
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Target address could not be parsed
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Scan batch-size hint out of range
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Sample cap must allow at least one key
    #[error("Invalid key limit {limit}: must be at least 1")]
    InvalidKeyLimit { limit: u64 },

    /// Queue capacity must be positive
    #[error("Invalid queue capacity {capacity}: must be at least 1")]
    InvalidQueueCapacity { capacity: usize },

    /// Unknown value type in the type filter
    #[error("Unknown value type '{name}': expected one of string, list, set, hash, zset")]
    InvalidValueType { name: String },

    /// No separators configured
    #[error("At least one key separator is required")]
    NoSeparators,

    /// Separators must be single ASCII bytes
    #[error("Invalid separator {separator:?}: separators must be ASCII characters")]
    InvalidSeparator { separator: char },
}

/// Pipeline stage errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A stage hit a store error; the whole run is aborted
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: StoreError,
    },

    /// A stage's neighbour went away before end of stream
    #[error("{stage} stage lost its channel before end of stream")]
    ChannelClosed { stage: &'static str },

    /// A stage task panicked or was aborted
    #[error("{stage} stage panicked: {message}")]
    Panicked { stage: &'static str, message: String },
}

impl PipelineError {
    /// Secondary failures caused by another stage going away
    pub fn is_secondary(&self) -> bool {
        matches!(self, PipelineError::ChannelClosed { .. })
    }
}

/// Session registry and query errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No analysis was ever started for the target
    #[error("No analysis found for target '{0}'")]
    UnknownTarget(String),

    /// Requested value type does not exist
    #[error("Unknown value type '{0}'")]
    UnknownValueType(String),

    /// The analysis for the target is still running
    #[error("An analysis for target '{0}' is already running")]
    AlreadyRunning(String),

    /// The analysis for the target failed; its tree was discarded
    #[error("Analysis for target '{target}' failed: {reason}")]
    AnalysisFailed { target: String, reason: String },

    /// Store access during a query failed
    #[error("Store error while querying '{target}': {reason}")]
    Store { target: String, reason: String },
}

/// Analytics server errors
#[cfg(feature = "server")]
#[derive(Error, Debug)]
pub enum ServerError {
    /// Session/query error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Invalid analysis request
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::Json;

        let status = match &self {
            ServerError::Session(SessionError::UnknownTarget(_)) => StatusCode::NOT_FOUND,
            ServerError::Session(SessionError::UnknownValueType(_)) => StatusCode::BAD_REQUEST,
            ServerError::Session(SessionError::AlreadyRunning(_)) => StatusCode::CONFLICT,
            ServerError::Session(SessionError::AnalysisFailed { .. }) => StatusCode::CONFLICT,
            ServerError::Session(SessionError::Store { .. }) => StatusCode::BAD_GATEWAY,
            ServerError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type alias for ServerError
#[cfg(feature = "server")]
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Result type alias for AnalyzerError
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for ConfigError
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for SessionError
pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_classification() {
        let dial = StoreError::ConnectionFailed {
            target: "127.0.0.1:6379".into(),
            reason: "refused".into(),
        };
        assert!(dial.is_connection_error());

        let cmd = StoreError::command("SCAN", "broken pipe");
        assert!(!cmd.is_connection_error());
        assert_eq!(cmd.to_string(), "SCAN failed: broken pipe");
    }

    #[test]
    fn test_secondary_pipeline_errors() {
        let closed = PipelineError::ChannelClosed { stage: "scan" };
        assert!(closed.is_secondary());

        let failed = PipelineError::StageFailed {
            stage: "size",
            source: StoreError::command("MEMORY USAGE", "timeout"),
        };
        assert!(!failed.is_secondary());
        assert!(failed.to_string().contains("MEMORY USAGE"));
    }

    #[test]
    fn test_error_conversion() {
        let err = SessionError::UnknownTarget("db:6379".into());
        let top: AnalyzerError = err.into();
        assert!(matches!(top, AnalyzerError::Session(_)));
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_server_error_status() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let cases = [
            (SessionError::UnknownTarget("a:1".into()), StatusCode::NOT_FOUND),
            (SessionError::UnknownValueType("stream".into()), StatusCode::BAD_REQUEST),
            (SessionError::AlreadyRunning("a:1".into()), StatusCode::CONFLICT),
            (
                SessionError::Store {
                    target: "a:1".into(),
                    reason: "refused".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }

        let io = ServerError::Io(std::io::Error::other("bind"));
        assert_eq!(io.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
