//! Custom error types for Foreman.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Foreman operations
#[derive(Error, Debug)]
pub enum ForemanError {
    /// Failed to load or parse configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Project workspace not initialized
    #[error("Not a foreman project: {path} does not exist (run 'foreman init' first)")]
    NotInitialized { path: PathBuf },

    /// Project workspace already initialized
    #[error("Already initialized: {path} exists")]
    AlreadyInitialized { path: PathBuf },

    /// Missing required tool on PATH
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    /// Not inside a git repository
    #[error("Not a git repository: {message}")]
    NotARepo { message: String },

    /// Could not determine the current branch
    #[error("Could not determine current branch: {message}")]
    NoBranch { message: String },

    /// Task store operation failed
    #[error("Task store error: {message}")]
    Store { message: String },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Agent process could not be launched or observed
    #[error("Agent error: {message}")]
    Agent { message: String },

    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForemanError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a task store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an agent error
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent {
            message: message.into(),
        }
    }

    /// Check if this error is fatal at startup (process cannot proceed)
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized { .. }
                | Self::MissingTool { .. }
                | Self::NotARepo { .. }
                | Self::NoBranch { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotARepo { .. } | Self::NoBranch { .. } => 2,
            Self::NotInitialized { .. } | Self::AlreadyInitialized { .. } => 3,
            Self::MissingTool { .. } => 6,
            Self::Config { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for Foreman results
pub type Result<T> = std::result::Result<T, ForemanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForemanError::git("push", "authentication failed");
        assert!(err.to_string().contains("push"));
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn test_is_startup_fatal() {
        assert!(ForemanError::NoBranch {
            message: "detached HEAD".into()
        }
        .is_startup_fatal());
        assert!(ForemanError::MissingTool {
            tool: "claude".into()
        }
        .is_startup_fatal());
        assert!(!ForemanError::store("bad line").is_startup_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ForemanError::NoBranch {
                message: "x".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            ForemanError::MissingTool {
                tool: "claude".into()
            }
            .exit_code(),
            6
        );
        assert_eq!(ForemanError::config("bad").exit_code(), 7);
        assert_eq!(ForemanError::store("bad").exit_code(), 1);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: ForemanError = io_err.into();
        assert!(matches!(err, ForemanError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
