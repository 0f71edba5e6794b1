//! Infrastructure services for the orchestrator.
//!
//! This module contains:
//! - EndpointRegistry: Named MCP endpoint handles
//! - McpClient: JSON-RPC client for MCP servers
//! - GitService: Repository inspection, branches and worktrees
//! - ProcessService: Command execution and log persistence

pub mod git;
pub mod mcp;
pub mod process;
pub mod registry;

pub use git::{GitService, Worktree};
pub use mcp::{McpClient, ToolResult};
pub use process::{CommandOutput, ProcessService};
pub use registry::{EndpointHandle, EndpointRegistry};
