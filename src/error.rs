//! Workbench error types

use thiserror::Error;

/// Workbench error type
#[derive(Error, Debug)]
pub enum Error {
    /// Agent executable could not be located
    #[error("Agent CLI not found. Is it installed and in PATH?")]
    AgentNotFound,

    /// Agent process could not be launched for another reason
    #[error("Failed to start agent process: {0}")]
    Launch(String),

    /// Unknown session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Operation attempted outside its valid session status
    #[error("Session not in expected state: expected {expected}, got {actual}")]
    InvalidState {
        /// Status the operation requires
        expected: &'static str,
        /// Status the session actually had
        actual: &'static str,
    },

    /// Agent process exited with a nonzero code
    #[error("Process exited with code {0}")]
    AgentProcess(i32),

    /// Failure while reading agent output
    #[error("Output stream error: {0}")]
    Stream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ticket creation error
    #[error("Ticket error: {0}")]
    Ticket(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for workbench operations
pub type Result<T> = std::result::Result<T, Error>;
