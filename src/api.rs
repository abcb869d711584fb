//! Caller-facing operations.
//!
//! [`Editor`] wires the reader, writer, history, reverter and collection
//! accessor over one [`RemoteStore`]. Every operation returns [`Result`], and
//! any result converts into the uniform [`Envelope`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collection::{CollectionAccessor, CollectionFilter, CollectionItem};
use crate::config::{CollectionConfig, Config};
use crate::error::{Error, JsonError, Result};
use crate::frontmatter::{FrontMatterDecoder, YamlFrontMatter};
use crate::history::HistoryReader;
use crate::locator::RepositoryRef;
use crate::reader::{Resource, RevisionReader, Staleness};
use crate::resource::{
    AuthorIdentity, CommitAuthor, RepositorySummary, ResourceId, Revision, WriteOutcome,
};
use crate::revert::Reverter;
use crate::staging::{self, FlushedChange, Operation, StagedChange, StagingLedger};
use crate::store::RemoteStore;
use crate::writer::ConflictSafeWriter;

/// Uniform response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonError>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(JsonError::from(error)),
        }
    }

    /// Partial success: the data produced before `error` stopped the work.
    pub fn partial(data: T, error: JsonError) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error),
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::err(&err),
        }
    }
}

impl<T> From<Result<T>> for Envelope<T> {
    fn from(result: Result<T>) -> Self {
        Self::from_result(result)
    }
}

/// Address of a resource as callers send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub path: String,
}

impl ResourceRequest {
    pub fn new(repo: impl Into<String>, branch: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            path: path.into(),
        }
    }

    pub fn resource_id(&self) -> Result<ResourceId> {
        let repository = RepositoryRef::parse(&self.repo)?;
        ResourceId::new(repository, self.branch.clone(), &self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessRequest {
    #[serde(flatten)]
    pub resource: ResourceRequest,
    #[serde(default)]
    pub known_revision: Option<Revision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    #[serde(flatten)]
    pub resource: ResourceRequest,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub base_revision: Option<Revision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResponse {
    pub staged: bool,
    pub operation: Operation,
    pub change: StagedChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    #[serde(flatten)]
    pub resource: ResourceRequest,
    pub content: String,
    pub message: String,
    #[serde(default)]
    pub base_revision: Option<Revision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertRequest {
    #[serde(flatten)]
    pub resource: ResourceRequest,
    pub target_commit_sha: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    #[serde(flatten)]
    pub resource: ResourceRequest,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One history entry; `message` is the first line only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sha: String,
    pub message: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRequest {
    #[serde(flatten)]
    pub resource: ResourceRequest,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardResponse {
    pub discarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<StagedChange>,
}

/// Where a flush stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushStop {
    pub resource: ResourceId,
    pub operation: Operation,
    pub error: JsonError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlushSummary {
    pub committed: Vec<FlushedChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<FlushStop>,
    pub remaining: usize,
}

/// Entry point for editorial operations against one store.
#[derive(Clone)]
pub struct Editor {
    store: Arc<dyn RemoteStore>,
    reader: RevisionReader,
    writer: ConflictSafeWriter,
    history: HistoryReader,
    reverter: Reverter,
    collection: CollectionAccessor,
    collection_config: CollectionConfig,
}

impl Editor {
    pub fn new(store: Arc<dyn RemoteStore>, config: &Config) -> Self {
        Self::with_decoder(store, config, Arc::new(YamlFrontMatter))
    }

    pub fn with_decoder(
        store: Arc<dyn RemoteStore>,
        config: &Config,
        decoder: Arc<dyn FrontMatterDecoder>,
    ) -> Self {
        let reader = RevisionReader::new(Arc::clone(&store));
        let writer = ConflictSafeWriter::new(Arc::clone(&store));
        let history = HistoryReader::new(Arc::clone(&store), &config.history);
        let reverter = Reverter::new(history.clone(), reader.clone(), writer.clone());
        let collection = CollectionAccessor::new(reader.clone(), decoder);
        Self {
            store,
            reader,
            writer,
            history,
            reverter,
            collection,
            collection_config: config.collection.clone(),
        }
    }

    /// Fetch a file or directory listing.
    pub async fn read(&self, request: &ResourceRequest) -> Result<Resource> {
        self.reader.read(&request.resource_id()?).await
    }

    /// Whether the caller's known revision is still current.
    pub async fn check_staleness(&self, request: &StalenessRequest) -> Result<Staleness> {
        let id = request.resource.resource_id()?;
        self.reader
            .check_staleness(&id, request.known_revision.as_ref())
            .await
    }

    /// Record an edit without contacting the store.
    pub fn stage(ledger: &mut StagingLedger, request: &StageRequest) -> Result<StageResponse> {
        let id = request.resource.resource_id()?;
        let operation = if request.delete {
            Operation::Delete
        } else {
            Operation::for_write(request.base_revision.as_ref())
        };
        let change = ledger.stage(
            id,
            operation,
            request.content.clone(),
            request.base_revision.clone(),
        )?;
        Ok(StageResponse {
            staged: true,
            operation,
            change,
        })
    }

    pub fn list_staged(ledger: &StagingLedger) -> Vec<StagedChange> {
        ledger.list_staged().to_vec()
    }

    pub fn discard(ledger: &mut StagingLedger, request: &ResourceRequest) -> Result<DiscardResponse> {
        let id = request.resource_id()?;
        let change = ledger.discard(&id);
        Ok(DiscardResponse {
            discarded: change.is_some(),
            change,
        })
    }

    /// Commit one resource now.
    ///
    /// The edit is staged first, replacing any pending edit for the same
    /// resource, then only that entry is flushed. On failure it stays staged.
    pub async fn commit(
        &self,
        ledger: &mut StagingLedger,
        request: &CommitRequest,
        author: &AuthorIdentity,
    ) -> Result<WriteOutcome> {
        require_message(&request.message)?;
        let id = request.resource.resource_id()?;
        let operation = Operation::for_write(request.base_revision.as_ref());
        ledger.stage(
            id.clone(),
            operation,
            Some(request.content.clone()),
            request.base_revision.clone(),
        )?;

        let flushed =
            staging::flush_one(ledger, &id, &self.writer, &request.message, author).await?;
        let revision = flushed.revision.ok_or_else(|| {
            Error::OperationFailed(format!("write of {id} returned no revision"))
        })?;
        Ok(WriteOutcome {
            revision,
            commit_sha: flushed.commit_sha,
        })
    }

    /// Commit every staged change in order, stopping at the first failure.
    pub async fn flush(
        &self,
        ledger: &mut StagingLedger,
        message: &str,
        author: &AuthorIdentity,
    ) -> Result<FlushSummary> {
        require_message(message)?;
        let report = staging::flush(ledger, &self.writer, message, author).await;
        Ok(FlushSummary {
            committed: report.committed,
            stopped_at: report.failure.map(|failure| FlushStop {
                resource: failure.change.resource,
                operation: failure.change.operation,
                error: JsonError::from(&failure.error),
            }),
            remaining: ledger.len(),
        })
    }

    /// Restore a resource to its content at an earlier commit.
    pub async fn revert(&self, request: &RevertRequest, author: &AuthorIdentity) -> Result<WriteOutcome> {
        require_message(&request.message)?;
        let id = request.resource.resource_id()?;
        self.reverter
            .revert_to(&id, &request.target_commit_sha, &request.message, author)
            .await
    }

    /// Commits touching a resource, newest first, messages cut to one line.
    pub async fn history(&self, request: &HistoryRequest) -> Result<Vec<HistoryEntry>> {
        let id = request.resource.resource_id()?;
        let limit = request.limit.unwrap_or_else(|| self.history.max_limit());
        let commits = self.history.list_commits(&id, limit).await?;
        Ok(commits
            .into_iter()
            .map(|commit| HistoryEntry {
                message: commit.summary().to_string(),
                sha: commit.sha,
                author: commit.author,
            })
            .collect())
    }

    /// Content of a resource at a commit.
    pub async fn materialize_at(&self, request: &ResourceRequest, commit_sha: &str) -> Result<String> {
        let id = request.resource_id()?;
        self.history.materialize_at(&id, commit_sha).await
    }

    /// Annotated listing of a directory.
    pub async fn list_collection(&self, request: &CollectionRequest) -> Result<Vec<CollectionItem>> {
        let id = request.resource.resource_id()?;
        let filter = CollectionFilter::new(&self.collection_config, request.pattern.as_deref())?;
        self.collection.list(&id, &filter).await
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        self.store.list_repositories().await
    }
}

fn require_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(Error::InvalidInput(
            "commit message cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes() {
        let ok: Envelope<u32> = Envelope::from_result(Ok(7));
        let json = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(json, serde_json::json!({"success": true, "data": 7}));

        let err: Envelope<u32> = Err(Error::conflict("a.md", "stale")).into();
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "conflict");
        assert_eq!(json["error"]["status"], 409);
        assert!(json.get("data").is_none());

        let partial = Envelope::partial(3u32, JsonError::from(&Error::conflict("b.md", "stale")));
        let json = serde_json::to_value(&partial).expect("serialize");
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], 3);
        assert_eq!(json["error"]["kind"], "conflict");
    }

    #[test]
    fn malformed_repo_is_invalid_repo_format() {
        let request = ResourceRequest::new("just-a-name", "main", "a.md");
        let err = request.resource_id().expect_err("bad repo");
        assert!(matches!(err, Error::InvalidRepoFormat(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn request_fields_flatten() {
        let request: StalenessRequest = serde_json::from_value(serde_json::json!({
            "repo": "acme/site",
            "branch": "main",
            "path": "posts/a.md",
            "known_revision": "abc"
        }))
        .expect("deserialize");
        assert_eq!(request.resource.path, "posts/a.md");
        assert_eq!(request.known_revision, Some(Revision::from("abc")));
    }
}
