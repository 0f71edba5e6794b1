//! Configuration management for the orchestrator.
//!
//! Supports layered configuration: defaults → project → user → env

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file
pub const PROJECT_CONFIG_FILE: &str = ".mcp-orchestrator.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// MCP server endpoints keyed by logical name ("github", "filesystem", ...)
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

impl OrchestratorConfig {
    /// Load configuration with hierarchy: defaults → project → user → env
    pub fn load(project_root: Option<&Path>) -> Result<Self, ConfigError> {
        let user_config = project_dirs().map(|dirs| dirs.config_dir().join("config.toml"));
        Self::load_layers(project_root, user_config.as_deref())
    }

    /// Same as [`load`](Self::load) with an explicit user config path.
    pub fn load_layers(
        project_root: Option<&Path>,
        user_config: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder();

        // 1. Start with defaults
        builder = builder.add_source(
            File::from_str(
                include_str!("../default_config.toml"),
                config::FileFormat::Toml,
            )
            .required(false),
        );

        // 2. Project-specific config
        if let Some(root) = project_root {
            let project_config = root.join(PROJECT_CONFIG_FILE);
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }
        }

        // 3. User config
        if let Some(user_config) = user_config {
            if user_config.exists() {
                builder =
                    builder.add_source(File::from(user_config.to_path_buf()).required(false));
            }
        }

        // 4. Environment variables (MCP_ORCH__*)
        builder = builder.add_source(
            Environment::with_prefix("MCP_ORCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check that every capability binding points at a configured endpoint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.branch_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "branch prefix `{}` contains whitespace",
                self.workflow.branch_prefix
            )));
        }

        let mut bindings: Vec<(&'static str, &str)> = Vec::new();
        if let Some(hosting) = &self.capabilities.context.hosting {
            bindings.push(("context", hosting.endpoint.as_str()));
        }
        if let Some(endpoint) = self.capabilities.generate.endpoint() {
            bindings.push(("generate", endpoint));
        }
        bindings.push(("update", self.capabilities.update.endpoint.as_str()));

        for (capability, endpoint) in bindings {
            if !self.endpoints.contains_key(endpoint) {
                return Err(ConfigError::UnknownEndpoint {
                    capability,
                    endpoint: endpoint.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Directory for command logs.
    ///
    /// A configured path is resolved against `project_root`; otherwise logs
    /// go to the per-user data directory, outside any repository.
    pub fn log_directory(&self, project_root: &Path) -> PathBuf {
        resolve_directory(project_root, self.workflow.log_directory.as_deref(), "logs")
    }

    /// Directory under which validation worktrees are created, resolved
    /// like [`log_directory`](Self::log_directory)
    pub fn worktree_directory(&self, project_root: &Path) -> PathBuf {
        resolve_directory(
            project_root,
            self.workflow.worktree_directory.as_deref(),
            "worktrees",
        )
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "mcp-orchestrator", "mcp-orchestrator")
}

fn resolve_directory(project_root: &Path, configured: Option<&Path>, name: &str) -> PathBuf {
    match configured {
        Some(dir) => project_root.join(dir),
        None => project_dirs()
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("mcp-orchestrator"))
            .join(name),
    }
}

/// Workflow-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Prefix prepended to the feature slug to form the target branch
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Base branch used when the caller does not supply one
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Directory for command logs (relative to the project root)
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
    /// Directory for validation worktrees (relative to the project root)
    #[serde(default)]
    pub worktree_directory: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            branch_prefix: default_branch_prefix(),
            base_branch: default_base_branch(),
            log_directory: None,
            worktree_directory: None,
        }
    }
}

fn default_branch_prefix() -> String {
    "feat/".to_string()
}

fn default_base_branch() -> String {
    "dev".to_string()
}

/// A stdio MCP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Command used to spawn the server
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the server process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A tool exposed by a named endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolBinding {
    pub endpoint: String,
    pub tool: String,
}

/// An external program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Command line as typed in a shell, for logs and failure reasons
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Bindings for the four workflow capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub context: ContextCapabilityConfig,
    #[serde(default)]
    pub generate: GeneratorBackend,
    #[serde(default)]
    pub validate: ValidateCapabilityConfig,
    #[serde(default = "default_update_binding")]
    pub update: ToolBinding,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            context: ContextCapabilityConfig::default(),
            generate: GeneratorBackend::default(),
            validate: ValidateCapabilityConfig::default(),
            update: default_update_binding(),
        }
    }
}

fn default_update_binding() -> ToolBinding {
    ToolBinding {
        endpoint: "github".to_string(),
        tool: "update_pull_request".to_string(),
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextCapabilityConfig {
    /// Source-hosting tool queried while assembling context
    #[serde(default)]
    pub hosting: Option<ToolBinding>,
}

/// Where generated change sets come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// Generation CLI fed the prompt on stdin
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Tool call on an MCP endpoint
    Mcp { endpoint: String, tool: String },
}

impl GeneratorBackend {
    /// The endpoint this backend depends on, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Command { .. } => None,
            Self::Mcp { endpoint, .. } => Some(endpoint),
        }
    }
}

impl Default for GeneratorBackend {
    fn default() -> Self {
        Self::Command {
            program: "llxprt".to_string(),
            args: vec!["--output-format".to_string(), "json".to_string()],
        }
    }
}

/// Validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateCapabilityConfig {
    /// Checks run in order (lint, build, test)
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.workflow.branch_prefix, "feat/");
        assert_eq!(config.workflow.base_branch, "dev");
        assert_eq!(config.workflow.log_directory, None);
        assert_eq!(config.workflow.worktree_directory, None);
        assert_eq!(config.capabilities.update.endpoint, "github");
        assert!(config.capabilities.validate.commands.is_empty());
    }

    #[test]
    fn test_load_embedded_defaults() {
        let temp = TempDir::new().unwrap();
        let config =
            OrchestratorConfig::load_layers(Some(temp.path()), Some(&temp.path().join("none")))
                .unwrap();

        assert!(config.endpoints.contains_key("github"));
        assert!(config.endpoints.contains_key("filesystem"));
        assert!(matches!(
            config.capabilities.generate,
            GeneratorBackend::Command { ref program, .. } if program == "llxprt"
        ));
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(PROJECT_CONFIG_FILE),
            r#"
[workflow]
base_branch = "main"

[endpoints.qodo]
command = "qodo-mcp"

[capabilities.generate]
type = "mcp"
endpoint = "qodo"
tool = "generate"

[capabilities.validate]
commands = [{ program = "cargo", args = ["test"] }]
"#,
        )
        .unwrap();

        let config =
            OrchestratorConfig::load_layers(Some(temp.path()), Some(&temp.path().join("none")))
                .unwrap();

        assert_eq!(config.workflow.base_branch, "main");
        assert_eq!(config.workflow.branch_prefix, "feat/");
        assert_eq!(config.endpoints["qodo"].command, "qodo-mcp");
        assert!(matches!(
            config.capabilities.generate,
            GeneratorBackend::Mcp { ref tool, .. } if tool == "generate"
        ));
        assert_eq!(
            config.capabilities.validate.commands,
            vec![CommandSpec::new("cargo", &["test"])]
        );
    }

    #[test]
    fn test_unknown_update_endpoint_rejected() {
        let mut config = OrchestratorConfig::default();
        config.capabilities.update.endpoint = "jira".to_string();

        match config.validate() {
            Err(ConfigError::UnknownEndpoint {
                capability,
                endpoint,
            }) => {
                assert_eq!(capability, "update");
                assert_eq!(endpoint, "jira");
            }
            other => panic!("expected UnknownEndpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_working_directories_stay_out_of_the_repository() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let mut config = OrchestratorConfig::default();

        assert!(!config.log_directory(&repo).starts_with(&repo));
        assert!(config.log_directory(&repo).ends_with("logs"));
        assert!(!config.worktree_directory(&repo).starts_with(&repo));
        assert!(config.worktree_directory(&repo).ends_with("worktrees"));

        config.workflow.log_directory = Some(temp.path().join("logs"));
        config.workflow.worktree_directory = Some(PathBuf::from("../wt"));
        assert_eq!(config.log_directory(&repo), temp.path().join("logs"));
        assert_eq!(config.worktree_directory(&repo), repo.join("../wt"));
    }

    #[test]
    fn test_command_display() {
        let command = CommandSpec::new("cargo", &["clippy", "--", "-D", "warnings"]);
        assert_eq!(command.display(), "cargo clippy -- -D warnings");
    }
}
