//! Unified error types for the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("Invalid task: {0}")]
    Task(#[from] TaskError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process error: {0}")]
    Process(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Capability `{capability}` references unknown endpoint `{endpoint}`")]
    UnknownEndpoint {
        capability: &'static str,
        endpoint: String,
    },
}

/// Git errors
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Path already exists: {0}")]
    PathExists(PathBuf),

    #[error("Git operation failed: {0}")]
    Operation(String),
}

/// MCP client errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Not initialized")]
    NotInitialized,

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Connection closed by server")]
    Closed,

    #[error("RPC error (code {code}): {message}")]
    RpcError { code: i32, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Rejections of a malformed task before any run starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("feature slug must not be empty")]
    EmptySlug,

    #[error("feature slug `{0}` is not safe to embed in a branch name")]
    InvalidSlug(String),

    #[error("base branch `{0}` is not a valid branch name")]
    InvalidBaseBranch(String),
}

/// Failures raised by a workflow step.
///
/// Each one moves the run to `Failed`. A failing validation is not one of
/// these; it is reported as a normal `ValidationOutcome::Fail`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("validation could not run: {0}")]
    ValidationUnavailable(String),

    #[error("update rejected: {0}")]
    Update(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    DeadlineExceeded,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for Git operations
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Result type alias for MCP operations
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Result type alias for workflow steps
pub type StepResult<T> = std::result::Result<T, StepError>;
