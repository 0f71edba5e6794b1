//! Data passed between workflow steps: assembled context, proposed changes,
//! validation outcome and update receipt.

use super::BranchName;
use crate::error::StepError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Repository and feature context gathered before generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlob {
    /// Repository root the run works in
    pub repo_root: PathBuf,
    /// Branch the change is based on
    pub base_branch: String,
    /// Checked-out branch, when the root is a git repository
    pub current_branch: Option<String>,
    /// Raw feature description
    pub feature_md: String,
    /// First heading of the feature description
    pub feature_title: Option<String>,
    /// Remaining headings, in document order
    pub feature_sections: Vec<String>,
    /// Text returned by the source-hosting endpoint, if one is bound
    pub hosting: Option<String>,
}

impl ContextBlob {
    /// Prompt handed to the generator
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("Repository: {}\n", self.repo_root.display()));
        prompt.push_str(&format!("Base branch: {}\n", self.base_branch));
        if let Some(current) = &self.current_branch {
            prompt.push_str(&format!("Current branch: {}\n", current));
        }
        if let Some(hosting) = &self.hosting {
            prompt.push_str("\n## Source hosting\n\n");
            prompt.push_str(hosting.trim_end());
            prompt.push('\n');
        }
        prompt.push_str("\n## Feature\n\n");
        prompt.push_str(self.feature_md.trim_end());
        prompt.push_str(
            "\n\nRespond with a JSON object: \
             {\"summary\": string, \"files\": [{\"path\": string, \"contents\": string}]}\n",
        );
        prompt
    }
}

/// One file written by a change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Full new contents
    pub contents: String,
}

/// Wire shape produced by generators
#[derive(Debug, Deserialize)]
struct ChangeSetDocument {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    files: Vec<FileChange>,
}

/// Changes proposed by the generator for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub repo_root: PathBuf,
    pub base_branch: String,
    /// Branch the changes are committed to once validated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchName>,
    pub summary: String,
    pub files: Vec<FileChange>,
}

impl ChangeSet {
    /// Build a change set anchored at the context's repository
    pub fn for_context(context: &ContextBlob, summary: String, files: Vec<FileChange>) -> Self {
        Self {
            repo_root: context.repo_root.clone(),
            base_branch: context.base_branch.clone(),
            branch: None,
            summary,
            files,
        }
    }

    /// Target `branch` with this change set
    pub fn on_branch(mut self, branch: BranchName) -> Self {
        self.branch = Some(branch);
        self
    }

    /// Parse generator output.
    ///
    /// The JSON object may be surrounded by other text (banners, progress
    /// lines). Each `{` is tried in turn as the start of a document; the
    /// first one that parses and proposes files wins, and anything after
    /// it is ignored.
    pub fn from_generator_output(context: &ContextBlob, output: &str) -> Result<Self, StepError> {
        let mut parsed_empty = false;
        let mut first_error = None;

        for (start, _) in output.match_indices('{') {
            let mut documents = serde_json::Deserializer::from_str(&output[start..])
                .into_iter::<ChangeSetDocument>();
            match documents.next() {
                Some(Ok(document)) if document.files.is_empty() => parsed_empty = true,
                Some(Ok(document)) => return Self::from_document(context, document),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => {}
            }
        }

        Err(match (parsed_empty, first_error) {
            (true, _) => StepError::Generation("no file changes proposed".to_string()),
            (false, Some(e)) => StepError::Generation(format!("unparseable output: {}", e)),
            (false, None) => StepError::Generation("output contains no JSON object".to_string()),
        })
    }

    fn from_document(
        context: &ContextBlob,
        document: ChangeSetDocument,
    ) -> Result<Self, StepError> {
        for file in &document.files {
            if !is_contained(&file.path) {
                return Err(StepError::Generation(format!(
                    "path escapes the repository: {}",
                    file.path.display()
                )));
            }
        }

        Ok(Self::for_context(context, document.summary, document.files))
    }

    /// Write every file under `root` (a checkout of the repository),
    /// creating parent directories as needed
    pub fn apply_to(&self, root: &Path) -> std::io::Result<()> {
        for file in &self.files {
            if !is_contained(&file.path) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path escapes the repository: {}", file.path.display()),
                ));
            }
            let target = root.join(&file.path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &file.contents)?;
        }
        Ok(())
    }

    /// Relative paths touched by this change set
    pub fn paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect()
    }
}

/// True when `path` is relative and never climbs above its base
fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Result of the validation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ValidationOutcome {
    Pass,
    Fail { reason: String },
}

/// Acknowledgement returned by the update capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReceipt {
    /// Text content returned by the tracking system
    pub message: String,
}
