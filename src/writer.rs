//! Conflict-safe writer.
//!
//! Every write forwards the caller's base revision; the store performs the
//! compare-and-swap. Nothing here retries: a `Conflict` goes straight back to
//! the caller, who must re-read before writing again.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::resource::{AuthorIdentity, ResourceId, Revision, WriteOutcome};
use crate::store::{DeleteContent, DeleteOutcome, PutContent, RemoteStore};

#[derive(Clone)]
pub struct ConflictSafeWriter {
    store: Arc<dyn RemoteStore>,
}

impl ConflictSafeWriter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Commit `content` to `id.path` on branch `id.reference`.
    ///
    /// `base_revision` is `None` only for a brand-new file.
    pub async fn write(
        &self,
        id: &ResourceId,
        content: &str,
        base_revision: Option<&Revision>,
        message: &str,
        author: &AuthorIdentity,
    ) -> Result<WriteOutcome> {
        let message = validate_message(message)?;
        validate_path(id)?;

        let request = PutContent {
            path: id.path.clone(),
            content: content.as_bytes().to_vec(),
            message: message.to_string(),
            branch: id.reference.clone(),
            base_revision: base_revision.cloned(),
            author: author.clone(),
        };

        match self.store.put_content(&id.repository, &request).await {
            Ok(outcome) => {
                info!(
                    repo = %id.repository,
                    path = %id.path,
                    reference = %id.reference,
                    op = "write",
                    commit = %outcome.commit_sha,
                    "write committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    repo = %id.repository,
                    path = %id.path,
                    reference = %id.reference,
                    op = "write",
                    error = %err,
                    "write rejected"
                );
                Err(err)
            }
        }
    }

    /// Delete `id.path` on branch `id.reference`, guarded by `base_revision`.
    pub async fn delete(
        &self,
        id: &ResourceId,
        base_revision: &Revision,
        message: &str,
        author: &AuthorIdentity,
    ) -> Result<DeleteOutcome> {
        let message = validate_message(message)?;
        validate_path(id)?;

        let request = DeleteContent {
            path: id.path.clone(),
            message: message.to_string(),
            revision: base_revision.clone(),
            branch: id.reference.clone(),
            author: author.clone(),
        };

        match self.store.delete_content(&id.repository, &request).await {
            Ok(outcome) => {
                info!(
                    repo = %id.repository,
                    path = %id.path,
                    reference = %id.reference,
                    op = "delete",
                    commit = %outcome.commit_sha,
                    "delete committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    repo = %id.repository,
                    path = %id.path,
                    reference = %id.reference,
                    op = "delete",
                    error = %err,
                    "delete rejected"
                );
                Err(err)
            }
        }
    }
}

fn validate_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(
            "commit message cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn validate_path(id: &ResourceId) -> Result<()> {
    if id.path.is_empty() {
        return Err(Error::InvalidInput(
            "cannot write the repository root".to_string(),
        ));
    }
    Ok(())
}
