//! Common test utilities and fake collaborators for remotemap tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use remotemap::{
    AccountSource, LocalRepo, MetadataLoader, RepoSource, ServerIdentity, ServerMetadata,
};

/// Account source yielding a fixed server list.
pub struct FakeAccounts(pub Vec<ServerIdentity>);

#[async_trait]
impl AccountSource for FakeAccounts {
    async fn servers(&self) -> Result<Vec<ServerIdentity>> {
        Ok(self.0.clone())
    }
}

/// Repository source over a mutable in-memory list.
pub struct FakeRepos {
    repos: Mutex<Vec<LocalRepo>>,
}

impl FakeRepos {
    pub fn new(repos: Vec<LocalRepo>) -> Self {
        Self {
            repos: Mutex::new(repos),
        }
    }

    pub fn replace(&self, repos: Vec<LocalRepo>) {
        *self.repos.lock().unwrap() = repos;
    }
}

#[async_trait]
impl RepoSource for FakeRepos {
    async fn repositories(&self) -> Result<Vec<LocalRepo>> {
        Ok(self.repos.lock().unwrap().clone())
    }
}

/// Metadata loader scripted to answer for a fixed set of identities,
/// recording every attempt in order.
pub struct ScriptedLoader {
    succeed_on: Vec<ServerIdentity>,
    pub attempts: Mutex<Vec<ServerIdentity>>,
    pub attempt_count: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new(succeed_on: Vec<ServerIdentity>) -> Self {
        Self {
            succeed_on,
            attempts: Mutex::new(Vec::new()),
            attempt_count: AtomicUsize::new(0),
        }
    }

    pub fn attempt_log(&self) -> Vec<ServerIdentity> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataLoader for ScriptedLoader {
    async fn load(&self, server: &ServerIdentity) -> Result<ServerMetadata> {
        self.attempts.lock().unwrap().push(server.clone());
        self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if self.succeed_on.contains(server) {
            Ok(ServerMetadata {
                version: "1.22.0".to_string(),
                name: Some("test server".to_string()),
            })
        } else {
            Err(anyhow!("connection refused"))
        }
    }
}

/// Build a LocalRepo fixture without touching the filesystem.
pub fn local_repo(path: &str, remotes: &[(&str, &str)]) -> LocalRepo {
    LocalRepo {
        path: PathBuf::from(path),
        remotes: remotes
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect(),
    }
}

/// Initialize a real git repository with the given remotes under `parent`.
pub fn init_git_repo(parent: &Path, name: &str, remotes: &[(&str, &str)]) -> PathBuf {
    let path = parent.join(name);
    std::fs::create_dir_all(&path).expect("Failed to create repo dir");

    run_git(&path, &["init", "--quiet"]);
    for (remote_name, url) in remotes {
        run_git(&path, &["remote", "add", remote_name, url]);
    }

    path
}

fn run_git(path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(path)
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}
