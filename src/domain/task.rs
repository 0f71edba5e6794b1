//! Task entity: the input of one workflow run.

use crate::error::TaskError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Base branch used when the caller does not name one
pub const DEFAULT_BASE_BRANCH: &str = "dev";

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap())
}

/// Feature identifier, validated to be safe inside a git ref.
/// Format: "[A-Za-z0-9][A-Za-z0-9._-]*" (e.g., "login-form")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureSlug(String);

impl FeatureSlug {
    /// Parse a slug, rejecting anything git would refuse in a branch name
    pub fn parse(s: &str) -> Result<Self, TaskError> {
        if s.is_empty() {
            return Err(TaskError::EmptySlug);
        }
        if !slug_pattern().is_match(s) || s.contains("..") || s.ends_with(".lock") || s.ends_with('.')
        {
            return Err(TaskError::InvalidSlug(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FeatureSlug {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FeatureSlug> for String {
    fn from(slug: FeatureSlug) -> Self {
        slug.0
    }
}

impl std::fmt::Display for FeatureSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target branch of a run: prefix + feature slug
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Derive the branch for a feature
    pub fn for_feature(prefix: &str, slug: &FeatureSlug) -> Self {
        Self(format!("{}{}", prefix, slug.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Everything one run needs to know about the feature being built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    repo_root: PathBuf,
    feature_md: String,
    feature_slug: FeatureSlug,
    base_branch: String,
}

impl TaskContext {
    /// Create a task against the default base branch
    pub fn new(
        repo_root: impl Into<PathBuf>,
        feature_md: impl Into<String>,
        feature_slug: &str,
    ) -> Result<Self, TaskError> {
        Ok(Self {
            repo_root: repo_root.into(),
            feature_md: feature_md.into(),
            feature_slug: FeatureSlug::parse(feature_slug)?,
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
        })
    }

    /// Override the base branch
    pub fn with_base_branch(mut self, base_branch: &str) -> Result<Self, TaskError> {
        if base_branch.is_empty() || base_branch.chars().any(char::is_whitespace) {
            return Err(TaskError::InvalidBaseBranch(base_branch.to_string()));
        }
        self.base_branch = base_branch.to_string();
        Ok(self)
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn feature_md(&self) -> &str {
        &self.feature_md
    }

    pub fn feature_slug(&self) -> &FeatureSlug {
        &self.feature_slug
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }
}
