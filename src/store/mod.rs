//! Remote repository store abstraction.
//!
//! The hosted service is reached through [`RemoteStore`]. The store owns
//! revision and commit identity and performs the compare-and-swap for every
//! write; callers only forward the base revision they last observed.
//!
//! Two backends are provided:
//! - [`github::GitHubStore`]: the hosted REST API over HTTPS
//! - [`git::GitStore`]: local repositories through libgit2, with the same
//!   contract (blob ids as revisions, branch tips updated only from the
//!   expected parent)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, StoreBackend};
use crate::error::{Error, Result};
use crate::locator::RepositoryRef;
use crate::resource::{AuthorIdentity, CommitRecord, RepositorySummary, Revision, WriteOutcome};

pub mod git;
pub mod github;

/// Encoding name the stores use for binary-safe content.
pub const BASE64_ENCODING: &str = "base64";

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One child of a directory as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub revision: Revision,
    pub size: u64,
}

/// A single file as reported by the store, content still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub path: String,
    pub content: String,
    pub encoding: String,
    pub revision: Revision,
    pub size: u64,
}

/// Response of a content lookup: the store answers with either shape for the
/// same call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteContent {
    File(RemoteFile),
    Directory(Vec<RemoteEntry>),
}

/// Create-or-update request.
#[derive(Debug, Clone)]
pub struct PutContent {
    pub path: String,
    pub content: Vec<u8>,
    pub message: String,
    pub branch: String,
    /// Absent for a brand-new file.
    pub base_revision: Option<Revision>,
    pub author: AuthorIdentity,
}

/// Delete request; `revision` must match the current blob.
#[derive(Debug, Clone)]
pub struct DeleteContent {
    pub path: String,
    pub message: String,
    pub revision: Revision,
    pub branch: String,
    pub author: AuthorIdentity,
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub commit_sha: String,
}

/// Operations consumed from the hosted repository service.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a file or directory listing at `reference`.
    async fn get_content(
        &self,
        repo: &RepositoryRef,
        path: &str,
        reference: &str,
    ) -> Result<RemoteContent>;

    /// Commits touching `path` reachable from `reference`, newest first.
    async fn list_commits(
        &self,
        repo: &RepositoryRef,
        path: &str,
        reference: &str,
        limit: usize,
    ) -> Result<Vec<CommitRecord>>;

    /// Create or update a file, rejecting stale base revisions.
    async fn put_content(&self, repo: &RepositoryRef, request: &PutContent)
        -> Result<WriteOutcome>;

    /// Delete a file, rejecting stale revisions.
    async fn delete_content(
        &self,
        repo: &RepositoryRef,
        request: &DeleteContent,
    ) -> Result<DeleteOutcome>;

    /// Repositories visible to the authenticated principal.
    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>>;
}

/// Build the store selected by configuration.
pub fn open_store(config: &Config) -> Result<Arc<dyn RemoteStore>> {
    match config.store.backend {
        StoreBackend::Github => {
            let token = std::env::var(&config.store.token_env)
                .ok()
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty());
            if token.is_none() {
                tracing::debug!(
                    token_env = %config.store.token_env,
                    "no API token in environment; requests are unauthenticated"
                );
            }
            let timeout = config.store.timeout_secs.map(Duration::from_secs);
            let store = github::GitHubStore::new(&config.store.api_base, token, timeout)?;
            Ok(Arc::new(store))
        }
        StoreBackend::Git => {
            let root = config.store.git_root.clone().ok_or_else(|| {
                Error::InvalidConfig("store.git_root is required for the git backend".to_string())
            })?;
            Ok(Arc::new(git::GitStore::new(root)))
        }
    }
}
