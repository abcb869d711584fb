//! Restore a resource to the content it had at an earlier commit.
//!
//! The revert is an ordinary conflict-checked write of the old content, so it
//! appears as a new commit on top of the branch.

use tracing::info;

use crate::error::{Error, Result};
use crate::history::HistoryReader;
use crate::reader::RevisionReader;
use crate::resource::{AuthorIdentity, ResourceId, WriteOutcome};
use crate::writer::ConflictSafeWriter;

#[derive(Clone)]
pub struct Reverter {
    history: HistoryReader,
    reader: RevisionReader,
    writer: ConflictSafeWriter,
}

impl Reverter {
    pub fn new(history: HistoryReader, reader: RevisionReader, writer: ConflictSafeWriter) -> Self {
        Self {
            history,
            reader,
            writer,
        }
    }

    /// Write the content `id.path` had at `target_commit_sha` onto branch
    /// `id.reference`.
    ///
    /// If the resource was deleted since, it is recreated.
    pub async fn revert_to(
        &self,
        id: &ResourceId,
        target_commit_sha: &str,
        message: &str,
        author: &AuthorIdentity,
    ) -> Result<WriteOutcome> {
        let content = self.history.materialize_at(id, target_commit_sha).await?;

        let current = match self.reader.read_optional(id).await? {
            Some(resource) => match resource.revision() {
                Some(revision) => Some(revision.clone()),
                None => return Err(Error::NotAFile(id.path.clone())),
            },
            None => None,
        };

        let outcome = self
            .writer
            .write(id, &content, current.as_ref(), message, author)
            .await?;
        info!(
            repo = %id.repository,
            path = %id.path,
            reference = %id.reference,
            op = "revert",
            target = target_commit_sha,
            commit = %outcome.commit_sha,
            "reverted resource"
        );
        Ok(outcome)
    }
}
