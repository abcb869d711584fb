//! Staging ledger: uncommitted edits held client-side.
//!
//! Staging never contacts the remote store. One entry per resource; staging the
//! same resource again replaces the earlier entry. Entries live until they are
//! discarded or flushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::resource::{AuthorIdentity, ResourceId, Revision};
use crate::writer::ConflictSafeWriter;

/// Kind of staged edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Create when there is no base revision, update otherwise.
    pub fn for_write(base_revision: Option<&Revision>) -> Self {
        if base_revision.is_some() {
            Operation::Update
        } else {
            Operation::Create
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One pending edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChange {
    pub id: Uuid,
    pub resource: ResourceId,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revision: Option<Revision>,
    pub staged_at: DateTime<Utc>,
}

/// Pending edits of one editing session, in staging order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingLedger {
    #[serde(default)]
    changes: Vec<StagedChange>,
}

impl StagingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit for `resource`, replacing any earlier one.
    pub fn stage(
        &mut self,
        resource: ResourceId,
        operation: Operation,
        content: Option<String>,
        base_revision: Option<Revision>,
    ) -> Result<StagedChange> {
        validate(&resource, operation, content.as_ref(), base_revision.as_ref())?;

        if let Some(previous) = self.remove(&resource) {
            debug!(
                path = %resource.path,
                reference = %resource.reference,
                replaced = %previous.id,
                "replacing staged change"
            );
        }

        let change = StagedChange {
            id: Uuid::new_v4(),
            resource,
            operation,
            content,
            base_revision,
            staged_at: Utc::now(),
        };
        self.changes.push(change.clone());
        Ok(change)
    }

    /// All pending edits, oldest first.
    pub fn list_staged(&self) -> &[StagedChange] {
        &self.changes
    }

    pub fn get(&self, resource: &ResourceId) -> Option<&StagedChange> {
        self.changes.iter().find(|change| &change.resource == resource)
    }

    /// Drop the pending edit for `resource`, if any.
    pub fn discard(&mut self, resource: &ResourceId) -> Option<StagedChange> {
        self.remove(resource)
    }

    /// Remove and return the pending edit for `resource` so it can be committed.
    pub fn take(&mut self, resource: &ResourceId) -> Option<StagedChange> {
        self.remove(resource)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    fn remove(&mut self, resource: &ResourceId) -> Option<StagedChange> {
        let index = self
            .changes
            .iter()
            .position(|change| &change.resource == resource)?;
        Some(self.changes.remove(index))
    }
}

fn validate(
    resource: &ResourceId,
    operation: Operation,
    content: Option<&String>,
    base_revision: Option<&Revision>,
) -> Result<()> {
    if resource.path.is_empty() {
        return Err(Error::InvalidInput(
            "cannot stage the repository root".to_string(),
        ));
    }
    match operation {
        Operation::Create | Operation::Update if content.is_none() => Err(Error::InvalidInput(
            format!("{operation} of '{}' requires content", resource.path),
        )),
        Operation::Delete if content.is_some() => Err(Error::InvalidInput(format!(
            "delete of '{}' cannot carry content",
            resource.path
        ))),
        Operation::Update | Operation::Delete if base_revision.is_none() => {
            Err(Error::InvalidInput(format!(
                "{operation} of '{}' requires a base revision",
                resource.path
            )))
        }
        Operation::Create if base_revision.is_some() => Err(Error::InvalidInput(format!(
            "create of '{}' cannot carry a base revision",
            resource.path
        ))),
        _ => Ok(()),
    }
}

/// A staged change that made it into a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushedChange {
    pub resource: ResourceId,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    pub commit_sha: String,
}

/// The change a flush stopped at.
#[derive(Debug)]
pub struct FlushFailure {
    pub change: StagedChange,
    pub error: Error,
}

/// Outcome of a flush: what committed, and where it stopped if it did.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub committed: Vec<FlushedChange>,
    pub failure: Option<FlushFailure>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Commit every staged change in staging order.
///
/// Committed changes leave the ledger. The first failure stops the flush; that
/// change and everything after it stay staged.
pub async fn flush(
    ledger: &mut StagingLedger,
    writer: &ConflictSafeWriter,
    message: &str,
    author: &AuthorIdentity,
) -> FlushReport {
    let mut report = FlushReport::default();

    while let Some(change) = ledger.changes.first().cloned() {
        match commit_change(writer, &change, message, author).await {
            Ok(flushed) => {
                ledger.changes.remove(0);
                report.committed.push(flushed);
            }
            Err(error) => {
                warn!(
                    repo = %change.resource.repository,
                    path = %change.resource.path,
                    reference = %change.resource.reference,
                    op = "flush",
                    remaining = ledger.len(),
                    error = %error,
                    "flush stopped"
                );
                report.failure = Some(FlushFailure { change, error });
                break;
            }
        }
    }

    report
}

/// Commit only the staged change for `resource`; other entries are untouched.
///
/// On failure the change stays staged.
pub async fn flush_one(
    ledger: &mut StagingLedger,
    resource: &ResourceId,
    writer: &ConflictSafeWriter,
    message: &str,
    author: &AuthorIdentity,
) -> Result<FlushedChange> {
    let change = ledger.get(resource).cloned().ok_or_else(|| {
        Error::InvalidInput(format!("nothing staged for {resource}"))
    })?;
    let flushed = commit_change(writer, &change, message, author).await?;
    ledger.remove(resource);
    Ok(flushed)
}

async fn commit_change(
    writer: &ConflictSafeWriter,
    change: &StagedChange,
    message: &str,
    author: &AuthorIdentity,
) -> Result<FlushedChange> {
    let resource = &change.resource;
    match change.operation {
        Operation::Create | Operation::Update => {
            let content = change.content.as_deref().unwrap_or_default();
            let outcome = writer
                .write(
                    resource,
                    content,
                    change.base_revision.as_ref(),
                    message,
                    author,
                )
                .await?;
            Ok(FlushedChange {
                resource: resource.clone(),
                operation: change.operation,
                revision: Some(outcome.revision),
                commit_sha: outcome.commit_sha,
            })
        }
        Operation::Delete => {
            let base = change.base_revision.as_ref().ok_or_else(|| {
                Error::InvalidInput(format!("delete of '{}' has no base revision", resource.path))
            })?;
            let outcome = writer.delete(resource, base, message, author).await?;
            Ok(FlushedChange {
                resource: resource.clone(),
                operation: Operation::Delete,
                revision: None,
                commit_sha: outcome.commit_sha,
            })
        }
    }
}
