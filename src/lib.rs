//! mcp-orchestrator: feature workflow orchestration over MCP endpoints
//!
//! A feature description and a target repository go in; a change set is
//! generated, validated and reflected on the tracking side, and a
//! structured [`WorkflowResult`] comes out.

pub mod app;
pub mod capabilities;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod services;

pub use app::Orchestrator;
pub use config::OrchestratorConfig;
pub use domain::{TaskContext, WorkflowResult};
pub use engine::{RunControl, WorkflowEngine};
pub use error::{AppError, Result};
