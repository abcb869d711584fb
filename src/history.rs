//! History reader: commits touching a resource, and its content at any of them.

use std::sync::Arc;

use tracing::debug;

use crate::config::HistoryConfig;
use crate::error::{Error, Result};
use crate::reader::{RevisionReader, Resource};
use crate::resource::{CommitRecord, ResourceId};
use crate::store::RemoteStore;

#[derive(Clone)]
pub struct HistoryReader {
    store: Arc<dyn RemoteStore>,
    reader: RevisionReader,
    max_limit: usize,
}

impl HistoryReader {
    pub fn new(store: Arc<dyn RemoteStore>, config: &HistoryConfig) -> Self {
        Self {
            reader: RevisionReader::new(Arc::clone(&store)),
            store,
            max_limit: config.max_limit,
        }
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    /// Up to `limit` commits touching `id.path`, in the store's order (most
    /// recent commit first).
    ///
    /// A zero limit is rejected; limits above the configured maximum are clamped.
    /// Author dates are not used for ordering: a rebased commit keeps its old
    /// author date but is still the newest.
    pub async fn list_commits(&self, id: &ResourceId, limit: usize) -> Result<Vec<CommitRecord>> {
        if limit == 0 {
            return Err(Error::InvalidInput("limit must be at least 1".to_string()));
        }
        let limit = limit.min(self.max_limit);

        debug!(repo = %id.repository, path = %id.path, reference = %id.reference, op = "history", limit, "listing commits");
        let mut commits = self
            .store
            .list_commits(&id.repository, &id.path, &id.reference, limit)
            .await?;

        commits.truncate(limit);
        Ok(commits)
    }

    /// Content of `id.path` as of `commit_sha`.
    pub async fn materialize_at(&self, id: &ResourceId, commit_sha: &str) -> Result<String> {
        let commit_sha = commit_sha.trim();
        if commit_sha.is_empty() {
            return Err(Error::InvalidInput("commit sha cannot be empty".to_string()));
        }
        match self.reader.read(&id.at(commit_sha)).await? {
            Resource::File { content, .. } => Ok(content),
            Resource::Directory { .. } => Err(Error::NotAFile(id.path.clone())),
        }
    }
}
