//! Core data model: resource addresses, revisions, identities and commits.
//!
//! Revisions and commit records are minted by the remote store; folio only
//! reads and forwards them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::locator::RepositoryRef;

/// A single addressable path inside a repository at a branch or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub repository: RepositoryRef,
    pub path: String,
    pub reference: String,
}

impl ResourceId {
    /// Build a resource id, normalizing the path.
    ///
    /// Leading and trailing slashes are dropped; the empty path addresses the
    /// repository root.
    pub fn new(
        repository: RepositoryRef,
        reference: impl Into<String>,
        path: impl AsRef<str>,
    ) -> Result<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(Error::InvalidInput("ref cannot be empty".to_string()));
        }
        let path = normalize_path(path.as_ref())?;
        Ok(Self {
            repository,
            path,
            reference,
        })
    }

    /// The same path addressed at another ref.
    pub fn at(&self, reference: impl Into<String>) -> Self {
        Self {
            repository: self.repository.clone(),
            path: self.path.clone(),
            reference: reference.into(),
        }
    }

    /// A child path of this resource at the same ref.
    pub fn child(&self, name: &str) -> Result<Self> {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self::new(self.repository.clone(), self.reference.clone(), path)
    }

    /// Final path segment, or empty for the repository root.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.repository, self.path, self.reference)
    }
}

fn normalize_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let invalid = trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(Error::InvalidInput(format!("invalid path '{raw}'")));
    }
    Ok(trimmed.to_string())
}

/// Opaque content-hash token for the exact bytes of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Revision {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name and email recorded as author and committer of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorIdentity {
    pub name: String,
    pub email: String,
}

impl AuthorIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Author block of a commit as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

/// One commit in a resource's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author: CommitAuthor,
}

impl CommitRecord {
    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Result of a successful content write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub revision: Revision,
    pub commit_sha: String,
}

/// Repository visible to the authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub full_name: String,
    pub owner: String,
    pub default_branch: String,
    pub visibility: String,
}
