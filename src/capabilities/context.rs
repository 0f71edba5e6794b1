//! Context assembly from the local checkout and the source-hosting endpoint.

use super::ContextSource;
use crate::domain::{ContextBlob, TaskContext};
use crate::error::{StepError, StepResult};
use crate::services::{EndpointHandle, GitService};
use pulldown_cmark::{Event, Parser, Tag};
use std::sync::Arc;

/// Reads the repository and feature description, optionally enriched by a
/// source-hosting tool (open PRs, issues, ...).
#[derive(Debug, Default)]
pub struct RepoContextReader {
    hosting: Option<(Arc<EndpointHandle>, String)>,
}

impl RepoContextReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query `tool` on `endpoint` while assembling context
    pub fn with_hosting(
        mut self,
        endpoint: Arc<EndpointHandle>,
        tool: impl Into<String>,
    ) -> Self {
        self.hosting = Some((endpoint, tool.into()));
        self
    }

    fn query_hosting(
        &self,
        task: &TaskContext,
        title: Option<&str>,
    ) -> StepResult<Option<String>> {
        let Some((endpoint, tool)) = &self.hosting else {
            return Ok(None);
        };

        let arguments = serde_json::json!({
            "repo_root": task.repo_root().to_string_lossy(),
            "base_branch": task.base_branch(),
            "feature": task.feature_slug().as_str(),
            "title": title,
        });
        let result = endpoint.call_tool(tool, arguments).map_err(|e| {
            StepError::ContextUnavailable(format!("{} endpoint: {}", endpoint.name(), e))
        })?;

        if result.is_error {
            return Err(StepError::ContextUnavailable(format!(
                "{} endpoint reported an error: {}",
                endpoint.name(),
                result.text()
            )));
        }
        Ok(Some(result.text()))
    }
}

impl ContextSource for RepoContextReader {
    fn read_context(&self, task: &TaskContext) -> StepResult<ContextBlob> {
        let root = task.repo_root();
        if !root.is_dir() {
            return Err(StepError::ContextUnavailable(format!(
                "repository root {} is not a readable directory",
                root.display()
            )));
        }
        if task.feature_md().trim().is_empty() {
            return Err(StepError::ContextUnavailable(
                "feature description is empty".to_string(),
            ));
        }

        let current_branch = if GitService::is_repository(root) {
            let git = GitService::open(root)
                .map_err(|e| StepError::ContextUnavailable(e.to_string()))?;
            let exists = git
                .branch_exists(task.base_branch())
                .map_err(|e| StepError::ContextUnavailable(e.to_string()))?;
            if !exists {
                return Err(StepError::ContextUnavailable(format!(
                    "base branch `{}` does not exist",
                    task.base_branch()
                )));
            }
            Some(
                git.current_branch()
                    .map_err(|e| StepError::ContextUnavailable(e.to_string()))?,
            )
        } else {
            tracing::debug!("{} is not a git checkout; skipping branch checks", root.display());
            None
        };

        let mut headings = feature_headings(task.feature_md()).into_iter();
        let feature_title = headings.next();
        let feature_sections: Vec<String> = headings.collect();

        let hosting = self.query_hosting(task, feature_title.as_deref())?;

        Ok(ContextBlob {
            repo_root: root.to_path_buf(),
            base_branch: task.base_branch().to_string(),
            current_branch,
            feature_md: task.feature_md().to_string(),
            feature_title,
            feature_sections,
            hosting,
        })
    }
}

/// Heading texts of a markdown document, in order
fn feature_headings(markdown: &str) -> Vec<String> {
    let mut headings = Vec::new();
    let mut current: Option<String> = None;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading(..)) => current = Some(String::new()),
            Event::End(Tag::Heading(..)) => {
                if let Some(text) = current.take() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        headings.push(text);
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.push_str(&text);
                }
            }
            _ => {}
        }
    }
    headings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::services::git::tests::create_test_repo;
    use crate::services::mcp::tests::fake_server_script;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const FEATURE: &str = "# Login form\n\nUsers sign in.\n\n## Scope\n\n- form\n\n## `auth` API\n";

    #[test]
    fn test_headings() {
        assert_eq!(
            feature_headings(FEATURE),
            vec!["Login form", "Scope", "auth API"]
        );
        assert!(feature_headings("no headings here").is_empty());
    }

    #[test]
    fn test_plain_directory() {
        let temp = TempDir::new().unwrap();
        let task = TaskContext::new(temp.path(), FEATURE, "login").unwrap();

        let context = RepoContextReader::new().read_context(&task).unwrap();

        assert_eq!(context.repo_root, temp.path());
        assert_eq!(context.base_branch, "dev");
        assert_eq!(context.current_branch, None);
        assert_eq!(context.feature_title.as_deref(), Some("Login form"));
        assert_eq!(context.feature_sections, vec!["Scope", "auth API"]);
        assert_eq!(context.hosting, None);
    }

    #[test]
    fn test_git_repository() {
        let (_temp, path) = create_test_repo();
        let task = TaskContext::new(&path, FEATURE, "login").unwrap();

        let context = RepoContextReader::new().read_context(&task).unwrap();
        assert_eq!(context.current_branch.as_deref(), Some("dev"));
    }

    #[test]
    fn test_missing_base_branch() {
        let (_temp, path) = create_test_repo();
        let task = TaskContext::new(&path, FEATURE, "login")
            .unwrap()
            .with_base_branch("release")
            .unwrap();

        let err = RepoContextReader::new().read_context(&task).unwrap_err();
        assert_eq!(
            err,
            StepError::ContextUnavailable("base branch `release` does not exist".to_string())
        );
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let task = TaskContext::new(temp.path().join("gone"), FEATURE, "login").unwrap();

        let err = RepoContextReader::new().read_context(&task).unwrap_err();
        assert!(matches!(err, StepError::ContextUnavailable(_)));
    }

    #[test]
    fn test_blank_feature() {
        let temp = TempDir::new().unwrap();
        let task = TaskContext::new(temp.path(), "  \n", "login").unwrap();

        let err = RepoContextReader::new().read_context(&task).unwrap_err();
        assert_eq!(
            err,
            StepError::ContextUnavailable("feature description is empty".to_string())
        );
    }

    #[test]
    fn test_hosting_endpoint() {
        let temp = TempDir::new().unwrap();
        let script = fake_server_script("open PRs: #3 refactor auth", false);
        let endpoint = Arc::new(EndpointHandle::new(
            "github",
            EndpointConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script],
                env: BTreeMap::new(),
            },
        ));
        let task = TaskContext::new(temp.path(), FEATURE, "login").unwrap();

        let context = RepoContextReader::new()
            .with_hosting(endpoint, "list_pull_requests")
            .read_context(&task)
            .unwrap();
        assert_eq!(context.hosting.as_deref(), Some("open PRs: #3 refactor auth"));
    }

    #[test]
    fn test_hosting_endpoint_error() {
        let temp = TempDir::new().unwrap();
        let script = fake_server_script("bad credentials", true);
        let endpoint = Arc::new(EndpointHandle::new(
            "github",
            EndpointConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script],
                env: BTreeMap::new(),
            },
        ));
        let task = TaskContext::new(temp.path(), FEATURE, "login").unwrap();

        let err = RepoContextReader::new()
            .with_hosting(endpoint, "list_pull_requests")
            .read_context(&task)
            .unwrap_err();
        assert!(matches!(err, StepError::ContextUnavailable(ref m) if m.contains("bad credentials")));
    }
}
