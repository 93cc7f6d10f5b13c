//! # Content Store
//!
//! Branch, file and pull-request primitives of the configuration repository.
//!
//! - `GitHubStore` - GitHub REST v3 adapter
//! - `MemoryStore` - in-process repository for dry runs and tests

mod github;
mod memory;

pub use github::GitHubStore;
pub use memory::{CommitRecord, MemoryStore, PullRecord};

use async_trait::async_trait;

use crate::error::StoreError;

/// Source-control operations consumed by the onboarding pipeline
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn branch_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Repository default branch (new base branches are cut from it)
    async fn default_branch(&self) -> Result<String, StoreError>;

    /// Create `name` from the head of `from`. Fails with
    /// [`StoreError::BranchNotFound`] when `from` does not exist.
    async fn create_branch(&self, name: &str, from: &str) -> Result<(), StoreError>;

    /// File text on a branch; `None` when the file (or branch) is absent
    async fn get_file_content(&self, branch: &str, path: &str)
        -> Result<Option<String>, StoreError>;

    /// Update the file if present, otherwise create it
    async fn put_file_content(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Whether an open pull request from `head` into `base` exists
    async fn pull_request_exists(&self, head: &str, base: &str) -> Result<bool, StoreError>;

    /// Open a pull request and return its URL
    async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<String, StoreError>;
}
