//! Change-set generators: a CLI fed on stdin, or an MCP tool.

use super::Generator;
use crate::config::CommandSpec;
use crate::domain::{ChangeSet, ContextBlob};
use crate::error::{StepError, StepResult};
use crate::services::{EndpointHandle, ProcessService};
use std::sync::Arc;

/// Lines of stderr quoted in failure messages
const TAIL_LINES: usize = 20;

/// Runs a generation CLI (e.g. `llxprt`) with the rendered prompt on stdin
/// and parses its stdout as a change-set document.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: CommandSpec,
    process: ProcessService,
}

impl CommandGenerator {
    pub fn new(command: CommandSpec, process: ProcessService) -> Self {
        Self { command, process }
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, context: &ContextBlob) -> StepResult<ChangeSet> {
        let prompt = context.render_prompt();
        let output = self
            .process
            .run("generate", &self.command, &context.repo_root, Some(&prompt))
            .map_err(|e| StepError::Generation(e.to_string()))?;

        if !output.success() {
            return Err(StepError::Generation(format!(
                "`{}` exited with {:?}: {}",
                self.command.display(),
                output.exit_code,
                output.tail(TAIL_LINES)
            )));
        }

        ChangeSet::from_generator_output(context, &output.stdout)
    }
}

/// Calls a generation tool on an MCP endpoint with the rendered prompt
#[derive(Debug)]
pub struct McpGenerator {
    endpoint: Arc<EndpointHandle>,
    tool: String,
}

impl McpGenerator {
    pub fn new(endpoint: Arc<EndpointHandle>, tool: impl Into<String>) -> Self {
        Self {
            endpoint,
            tool: tool.into(),
        }
    }
}

impl Generator for McpGenerator {
    fn generate(&self, context: &ContextBlob) -> StepResult<ChangeSet> {
        let arguments = serde_json::json!({
            "prompt": context.render_prompt(),
            "repo_root": context.repo_root.to_string_lossy(),
            "base_branch": context.base_branch,
        });

        let result = self
            .endpoint
            .call_tool(&self.tool, arguments)
            .map_err(|e| StepError::Generation(format!("{}: {}", self.endpoint.name(), e)))?;

        if result.is_error {
            return Err(StepError::Generation(format!(
                "{} reported an error: {}",
                self.tool,
                result.text()
            )));
        }

        ChangeSet::from_generator_output(context, &result.text())
    }
}
