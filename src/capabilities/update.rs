//! Tracking update through an MCP tool (PR / issues / project board).

use super::Updater;
use crate::domain::{BranchName, ChangeSet, UpdateReceipt};
use crate::error::{StepError, StepResult};
use crate::services::{EndpointHandle, GitService};
use std::sync::Arc;

/// Reflects a validated change set on the tracking side by calling a tool
/// with the branch, its head commit (when the repository has one) and the
/// changed files.
#[derive(Debug)]
pub struct McpUpdater {
    endpoint: Arc<EndpointHandle>,
    tool: String,
}

impl McpUpdater {
    pub fn new(endpoint: Arc<EndpointHandle>, tool: impl Into<String>) -> Self {
        Self {
            endpoint,
            tool: tool.into(),
        }
    }
}

impl Updater for McpUpdater {
    fn apply_update(
        &self,
        change_set: &ChangeSet,
        branch: &BranchName,
    ) -> StepResult<UpdateReceipt> {
        let commit = GitService::open(&change_set.repo_root)
            .and_then(|git| git.branch_head(branch.as_str()))
            .ok();
        tracing::debug!(%branch, ?commit, files = ?change_set.paths(), "Publishing change set");

        let arguments = serde_json::json!({
            "branch": branch.as_str(),
            "base_branch": change_set.base_branch,
            "commit": commit,
            "summary": change_set.summary,
            "files": change_set.files,
        });

        let result = self
            .endpoint
            .call_tool(&self.tool, arguments)
            .map_err(|e| StepError::Update(format!("{}: {}", self.endpoint.name(), e)))?;

        if result.is_error {
            return Err(StepError::Update(result.text()));
        }

        Ok(UpdateReceipt {
            message: result.text(),
        })
    }
}
