//! In-memory content store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ContentStore;
use crate::error::StoreError;

/// A recorded file write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub branch: String,
    pub path: String,
    pub content: String,
    pub message: String,
}

/// A recorded pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRecord {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub url: String,
}

#[derive(Default)]
struct Repository {
    default_branch: String,
    branches: BTreeMap<String, BTreeMap<String, String>>,
    pulls: Vec<PullRecord>,
    commits: Vec<CommitRecord>,
}

/// Repository held in process memory
pub struct MemoryStore {
    repo: RwLock<Repository>,
}

impl MemoryStore {
    /// Empty repository with a single default branch
    pub fn new(default_branch: &str) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(default_branch.to_string(), BTreeMap::new());
        Self {
            repo: RwLock::new(Repository {
                default_branch: default_branch.to_string(),
                branches,
                ..Default::default()
            }),
        }
    }

    /// Add a branch (copying nothing)
    pub fn with_branch(mut self, name: &str) -> Self {
        self.repo
            .get_mut()
            .branches
            .entry(name.to_string())
            .or_default();
        self
    }

    /// Seed a file, creating the branch if needed
    pub fn with_file(mut self, branch: &str, path: &str, content: &str) -> Self {
        self.repo
            .get_mut()
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Seed an open pull request
    pub fn with_pull_request(mut self, head: &str, base: &str) -> Self {
        let repo = self.repo.get_mut();
        let url = format!("memory://pulls/{}", repo.pulls.len() + 1);
        repo.pulls.push(PullRecord {
            head: head.to_string(),
            base: base.to_string(),
            title: String::new(),
            body: String::new(),
            url,
        });
        self
    }

    pub async fn commits(&self) -> Vec<CommitRecord> {
        self.repo.read().await.commits.clone()
    }

    pub async fn pulls(&self) -> Vec<PullRecord> {
        self.repo.read().await.pulls.clone()
    }

    pub async fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.repo
            .read()
            .await
            .branches
            .get(branch)
            .and_then(|files| files.get(path))
            .cloned()
    }

    pub async fn branches(&self) -> Vec<String> {
        self.repo.read().await.branches.keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("main")
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.repo.read().await.branches.contains_key(name))
    }

    async fn default_branch(&self) -> Result<String, StoreError> {
        Ok(self.repo.read().await.default_branch.clone())
    }

    async fn create_branch(&self, name: &str, from: &str) -> Result<(), StoreError> {
        let mut repo = self.repo.write().await;
        let files = repo
            .branches
            .get(from)
            .cloned()
            .ok_or_else(|| StoreError::BranchNotFound(from.to_string()))?;
        repo.branches.insert(name.to_string(), files);
        Ok(())
    }

    async fn get_file_content(
        &self,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.file(branch, path).await)
    }

    async fn put_file_content(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut repo = self.repo.write().await;
        let files = repo
            .branches
            .get_mut(branch)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        files.insert(path.to_string(), content.to_string());
        repo.commits.push(CommitRecord {
            branch: branch.to_string(),
            path: path.to_string(),
            content: content.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn pull_request_exists(&self, head: &str, base: &str) -> Result<bool, StoreError> {
        Ok(self
            .repo
            .read()
            .await
            .pulls
            .iter()
            .any(|pr| pr.head == head && pr.base == base))
    }

    async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError> {
        let mut repo = self.repo.write().await;
        for branch in [head, base] {
            if !repo.branches.contains_key(branch) {
                return Err(StoreError::BranchNotFound(branch.to_string()));
            }
        }

        let url = format!("memory://pulls/{}", repo.pulls.len() + 1);
        repo.pulls.push(PullRecord {
            head: head.to_string(),
            base: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            url: url.clone(),
        });
        Ok(url)
    }
}
