//! Revision reader: fetch a resource and its revision token.
//!
//! The store's file-or-directory answer is resolved here into [`Resource`];
//! nothing downstream looks at raw store shapes.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::resource::{ResourceId, Revision};
use crate::store::{RemoteContent, RemoteEntry, RemoteFile, RemoteStore, BASE64_ENCODING};

/// A decoded resource at a ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Resource {
    File {
        content: String,
        revision: Revision,
        size: u64,
    },
    Directory {
        entries: Vec<RemoteEntry>,
    },
}

impl Resource {
    pub fn revision(&self) -> Option<&Revision> {
        match self {
            Resource::File { revision, .. } => Some(revision),
            Resource::Directory { .. } => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Resource::File { .. })
    }
}

/// Answer of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staleness {
    pub exists: bool,
    pub current_revision: Option<Revision>,
    pub changed: bool,
}

/// Reads resources through a [`RemoteStore`].
#[derive(Clone)]
pub struct RevisionReader {
    store: Arc<dyn RemoteStore>,
}

impl RevisionReader {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Fetch `id`, decoding file content to text.
    pub async fn read(&self, id: &ResourceId) -> Result<Resource> {
        debug!(repo = %id.repository, path = %id.path, reference = %id.reference, op = "read", "reading resource");
        let content = self
            .store
            .get_content(&id.repository, &id.path, &id.reference)
            .await?;
        resolve(content)
    }

    /// Like [`read`](Self::read), with a missing path as `None`.
    pub async fn read_optional(&self, id: &ResourceId) -> Result<Option<Resource>> {
        match self.read(id).await {
            Ok(resource) => Ok(Some(resource)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Compare the caller's last known revision with the live one.
    pub async fn check_staleness(
        &self,
        id: &ResourceId,
        known_revision: Option<&Revision>,
    ) -> Result<Staleness> {
        let current = match self.read_optional(id).await? {
            None => None,
            Some(Resource::File { revision, .. }) => Some(revision),
            Some(Resource::Directory { .. }) => return Err(Error::NotAFile(id.path.clone())),
        };
        let changed = current.as_ref() != known_revision;
        Ok(Staleness {
            exists: current.is_some(),
            current_revision: current,
            changed,
        })
    }

    /// Fetch `id` and require a file.
    pub async fn read_file(&self, id: &ResourceId) -> Result<(String, Revision)> {
        match self.read(id).await? {
            Resource::File {
                content, revision, ..
            } => Ok((content, revision)),
            Resource::Directory { .. } => Err(Error::NotAFile(id.path.clone())),
        }
    }
}

/// Convert a raw store answer into a [`Resource`].
pub fn resolve(content: RemoteContent) -> Result<Resource> {
    match content {
        RemoteContent::File(file) => {
            let text = decode_file(&file)?;
            Ok(Resource::File {
                content: text,
                revision: file.revision,
                size: file.size,
            })
        }
        RemoteContent::Directory(entries) => Ok(Resource::Directory { entries }),
    }
}

/// Decode a file's content; base64 is the only accepted encoding.
pub fn decode_file(file: &RemoteFile) -> Result<String> {
    let undecodable = |encoding: &str| Error::Undecodable {
        path: file.path.clone(),
        encoding: encoding.to_string(),
    };

    if file.encoding != BASE64_ENCODING {
        return Err(undecodable(&file.encoding));
    }

    let compact: String = file
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|_| undecodable("base64 (malformed)"))?;
    String::from_utf8(bytes).map_err(|_| undecodable("base64 (not utf-8)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content: &str, encoding: &str) -> RemoteFile {
        RemoteFile {
            name: "a.md".to_string(),
            path: "posts/a.md".to_string(),
            content: content.to_string(),
            encoding: encoding.to_string(),
            revision: Revision::from("r1"),
            size: 5,
        }
    }

    #[test]
    fn decodes_wrapped_base64() {
        // The hosted API wraps base64 at 60 columns.
        let decoded = decode_file(&file("aGVs\nbG8=\n", "base64")).expect("decode");
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn other_encodings_are_undecodable() {
        let err = decode_file(&file("", "none")).expect_err("undecodable");
        match err {
            Error::Undecodable { path, encoding } => {
                assert_eq!(path, "posts/a.md");
                assert_eq!(encoding, "none");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_and_binary_are_undecodable() {
        assert!(matches!(
            decode_file(&file("!!!", "base64")),
            Err(Error::Undecodable { .. })
        ));
        let binary = BASE64.encode([0xff, 0xfe, 0x00]);
        assert!(matches!(
            decode_file(&file(&binary, "base64")),
            Err(Error::Undecodable { .. })
        ));
    }

    #[test]
    fn directory_resolves_without_revision() {
        let resource = resolve(RemoteContent::Directory(Vec::new())).expect("resolve");
        assert!(!resource.is_file());
        assert!(resource.revision().is_none());
    }
}
