//! Local repository enumeration
//!
//! Provides the [`RepoSource`] abstraction the reconciler consumes, plus the
//! default [`GitScanner`] implementation that walks configured root
//! directories for git repositories and reads their remotes through the git
//! binary.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One local git repository and its configured remotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepo {
    /// Repository working-tree root
    pub path: PathBuf,
    /// (remote name, remote url) pairs in config order
    pub remotes: Vec<(String, String)>,
}

impl LocalRepo {
    /// Repository display name (directory name)
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A remote URL bound to its owning repository and remote name.
///
/// Coordinates are transient: the reconciler rebuilds them from the
/// repository source on every pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteCoordinate {
    pub repository: PathBuf,
    pub remote_name: String,
    pub url: String,
}

/// Source of local repositories and their remotes.
///
/// Implement this to feed the reconciler from somewhere other than the
/// filesystem scanner, e.g. a fixed list in tests.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// Current set of local repositories. Errors are fatal to the
    /// reconciliation pass that requested them.
    async fn repositories(&self) -> Result<Vec<LocalRepo>>;
}

/// Flatten repositories into remote coordinates, preserving repository order.
pub fn flatten_remotes(repos: &[LocalRepo]) -> Vec<RemoteCoordinate> {
    let mut coordinates = Vec::new();
    for repo in repos {
        for (name, url) in &repo.remotes {
            coordinates.push(RemoteCoordinate {
                repository: repo.path.clone(),
                remote_name: name.clone(),
                url: url.clone(),
            });
        }
    }
    coordinates
}

/// Filesystem-backed repository source.
///
/// Walks each configured root for directories containing `.git`, without
/// descending into repositories, then asks the git binary for each
/// repository's remotes.
pub struct GitScanner {
    roots: Vec<PathBuf>,
}

impl GitScanner {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Find repository working trees under one root.
    fn find_repos(root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                // Skip .git directories and don't descend into them
                if e.file_name() == ".git" {
                    return false;
                }

                // Don't descend below a repository root
                if let Some(parent) = e.path().parent() {
                    if parent.join(".git").exists() && parent != root {
                        return false;
                    }
                }

                true
            })
            .filter_map(|entry| entry.ok())
        {
            if entry.file_type().is_dir() && entry.path().join(".git").exists() {
                found.push(entry.path().to_path_buf());
            }
        }

        found
    }

    /// Read the configured remotes of one repository via `git remote -v`.
    async fn read_remotes(path: &Path) -> Result<Vec<(String, String)>> {
        let output = AsyncCommand::new("git")
            .arg("-C")
            .arg(path)
            .args(["remote", "-v"])
            .output()
            .await
            .with_context(|| format!("Failed to run git remote -v in {}", path.display()))?;

        if !output.status.success() {
            return Err(anyhow!(
                "git remote -v failed in {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stdout =
            String::from_utf8(output.stdout).context("git remote -v output is not valid UTF-8")?;
        Ok(parse_remote_output(&stdout))
    }
}

/// Parse `git remote -v` output into (name, url) pairs.
///
/// Fetch and push entries for the same remote are collapsed; the fetch URL
/// wins when both are present.
pub fn parse_remote_output(output: &str) -> Vec<(String, String)> {
    let mut remotes: Vec<(String, String)> = Vec::new();

    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        let kind = parts.next().unwrap_or("(fetch)");

        match remotes.iter().position(|(n, _)| n == name) {
            Some(idx) => {
                if kind == "(fetch)" {
                    remotes[idx].1 = url.to_string();
                }
            }
            None => remotes.push((name.to_string(), url.to_string())),
        }
    }

    remotes
}

#[async_trait]
impl RepoSource for GitScanner {
    async fn repositories(&self) -> Result<Vec<LocalRepo>> {
        let mut repos = Vec::new();

        for root in &self.roots {
            if !root.exists() {
                warn!("Scan root does not exist: {}", root.display());
                continue;
            }

            for path in Self::find_repos(root) {
                let remotes = Self::read_remotes(&path).await?;
                debug!(
                    "Found repository {} with {} remote(s)",
                    path.display(),
                    remotes.len()
                );
                repos.push(LocalRepo { path, remotes });
            }
        }

        Ok(repos)
    }
}
