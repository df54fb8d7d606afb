//! The fetched package and the edits the patch pipeline makes to it.
//!
//! `BundleMutator` is the seam between pipeline steps and the mechanism that
//! performs an edit: kpt functions in production, in-process YAML edits for
//! offline use and tests.
use crate::util::{display_path, remove_file_if_present, walk_files};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

mod kpt;
mod local;

pub use kpt::KptMutator;
pub use local::LocalMutator;

/// Handle to a fetched package root.
#[derive(Debug, Clone)]
pub struct Bundle {
    root: PathBuf,
}

impl Bundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// YAML files in the package, sorted by path.
    pub fn yaml_files(&self) -> Result<Vec<PathBuf>> {
        let files = walk_files(&self.root)
            .with_context(|| format!("list package files under {}", self.root.display()))?;
        Ok(files
            .into_iter()
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect())
    }

    /// Delete every file whose name matches; a file vanishing first is not an error.
    pub fn remove_files(&self, matcher: &FileMatcher) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in walk_files(&self.root)
            .with_context(|| format!("list package files under {}", self.root.display()))?
        {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !matcher.matches(name) {
                continue;
            }
            if remove_file_if_present(&path)
                .with_context(|| format!("remove {}", path.display()))?
            {
                tracing::debug!(file = %display_path(&path, Some(&self.root)), "removed file");
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

/// Identifies resources by kind, name and optionally namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSelector {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceSelector {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }
}

impl std::fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.kind, namespace, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A container environment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Removal of a database dependency from a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRewrite {
    /// Init container waiting on the database.
    pub init_container: String,
    /// Value written into every `--cache-type=` argument.
    pub cache_type: String,
}

/// Filename glob of the form `*needle*.ext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatcher {
    pub contains: String,
    pub extension: String,
}

impl FileMatcher {
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.len() > self.extension.len()
            && file_name.ends_with(&format!(".{}", self.extension))
            && file_name.contains(self.contains.as_str())
    }
}

impl std::fmt::Display for FileMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "*{}*.{}", self.contains, self.extension)
    }
}

pub trait BundleMutator {
    /// Replace the first container's `env` list on matching workloads.
    fn set_container_env(&mut self, target: &ResourceSelector, env: &[EnvVar]) -> Result<()>;

    /// Set `data.<key>` on matching ConfigMaps.
    fn set_config_value(&mut self, target: &ResourceSelector, key: &str, value: &str)
        -> Result<()>;

    /// Drop the database init container and env import, and pin `--cache-type=`.
    fn rewrite_cache_wiring(&mut self, target: &ResourceSelector, rewrite: &CacheRewrite)
        -> Result<()>;

    /// Replace every value occurrence of `pattern` across the package.
    fn replace_values(&mut self, pattern: &Regex, replacement: &str) -> Result<()>;

    /// Delete package files matching `matcher`, returning how many went away.
    fn remove_files(&mut self, matcher: &FileMatcher) -> Result<usize>;
}
