//! Directory listings annotated with per-item front-matter.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::CollectionConfig;
use crate::error::{Error, Result};
use crate::frontmatter::{FrontMatter, FrontMatterDecoder};
use crate::reader::{Resource, RevisionReader};
use crate::resource::{ResourceId, Revision};
use crate::store::{EntryKind, RemoteEntry};

const EXCERPT_CHARS: usize = 200;

/// One listed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub name: String,
    pub path: String,
    pub revision: Revision,
    pub title: String,
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Which children of a directory are listed.
#[derive(Debug, Clone)]
pub struct CollectionFilter {
    extensions: Vec<String>,
    pattern: Option<glob::Pattern>,
    index_name: String,
}

impl CollectionFilter {
    /// Filter from configuration plus an optional glob on file names.
    pub fn new(config: &CollectionConfig, pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|raw| {
                glob::Pattern::new(raw)
                    .map_err(|err| Error::InvalidInput(format!("invalid pattern '{raw}': {err}")))
            })
            .transpose()?;
        Ok(Self {
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            pattern,
            index_name: config.index_name.clone(),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        let extension_ok = extension(name)
            .map(|ext| self.extensions.iter().any(|allowed| allowed == &ext))
            .unwrap_or(false);
        extension_ok
            && self
                .pattern
                .as_ref()
                .map_or(true, |pattern| pattern.matches(name))
    }

    fn is_index(&self, name: &str, front_matter: Option<&FrontMatter>) -> bool {
        stem(name) == self.index_name
            || front_matter.and_then(|fm| fm.get_str("slug")) == Some(self.index_name.as_str())
    }
}

impl Default for CollectionFilter {
    fn default() -> Self {
        Self {
            extensions: CollectionConfig::default().extensions,
            pattern: None,
            index_name: CollectionConfig::default().index_name,
        }
    }
}

/// Lists collections through a reader and a front-matter decoder.
#[derive(Clone)]
pub struct CollectionAccessor {
    reader: RevisionReader,
    decoder: Arc<dyn FrontMatterDecoder>,
}

impl CollectionAccessor {
    pub fn new(reader: RevisionReader, decoder: Arc<dyn FrontMatterDecoder>) -> Self {
        Self { reader, decoder }
    }

    /// Immediate children of `id` that pass `filter`, sorted by name.
    ///
    /// A file at `id` yields just that file.
    pub async fn list(&self, id: &ResourceId, filter: &CollectionFilter) -> Result<Vec<CollectionItem>> {
        let entries = match self.reader.read(id).await? {
            Resource::File {
                content, revision, ..
            } => {
                let name = id.file_name().to_string();
                let front_matter = self.decode(id, &content);
                return Ok(vec![build_item(
                    name,
                    id.path.clone(),
                    revision,
                    front_matter.unwrap_or_default(),
                )]);
            }
            Resource::Directory { entries } => entries,
        };

        let mut items = Vec::new();
        for entry in entries {
            if entry.kind != EntryKind::File || !filter.matches(&entry.name) {
                continue;
            }
            if stem(&entry.name) == filter.index_name {
                continue;
            }
            if let Some(item) = self.load_item(id, entry, filter).await {
                items.push(item);
            }
        }

        items.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(repo = %id.repository, path = %id.path, reference = %id.reference, op = "list", count = items.len(), "listed collection");
        Ok(items)
    }

    /// Fetch and decode one child; failures degrade to a bare item.
    async fn load_item(
        &self,
        parent: &ResourceId,
        entry: RemoteEntry,
        filter: &CollectionFilter,
    ) -> Option<CollectionItem> {
        let child = ResourceId {
            repository: parent.repository.clone(),
            path: entry.path.clone(),
            reference: parent.reference.clone(),
        };

        let fetched = match self.reader.read_file(&child).await {
            Ok((content, revision)) => self
                .decode(&child, &content)
                .map(|front_matter| (front_matter, revision)),
            Err(err) => {
                warn!(
                    repo = %child.repository,
                    path = %child.path,
                    reference = %child.reference,
                    op = "list",
                    error = %err,
                    "could not read collection item"
                );
                None
            }
        };

        match fetched {
            Some((front_matter, _)) if filter.is_index(&entry.name, Some(&front_matter)) => None,
            Some((front_matter, revision)) => {
                Some(build_item(entry.name, entry.path, revision, front_matter))
            }
            None => Some(build_item(
                entry.name,
                entry.path,
                entry.revision,
                FrontMatter::default(),
            )),
        }
    }

    fn decode(&self, id: &ResourceId, content: &str) -> Option<FrontMatter> {
        match self.decoder.decode(content) {
            Ok(front_matter) => Some(front_matter),
            Err(err) => {
                warn!(
                    repo = %id.repository,
                    path = %id.path,
                    reference = %id.reference,
                    op = "list",
                    error = %err,
                    "could not decode front-matter"
                );
                None
            }
        }
    }
}

fn build_item(name: String, path: String, revision: Revision, front_matter: FrontMatter) -> CollectionItem {
    let title = front_matter
        .get_str("title")
        .map(str::to_string)
        .unwrap_or_else(|| title_from_name(&name));
    let excerpt = front_matter
        .get_str("excerpt")
        .or_else(|| front_matter.get_str("description"))
        .map(str::to_string)
        .or_else(|| first_paragraph(&front_matter.body));

    CollectionItem {
        name,
        path,
        revision,
        title,
        metadata: front_matter.metadata,
        excerpt,
    }
}

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// `my-first_post.md` -> `My first post`
pub fn title_from_name(name: &str) -> String {
    let words = stem(name).replace(['-', '_'], " ");
    let words = words.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name.to_string(),
    }
}

fn first_paragraph(body: &str) -> Option<String> {
    let line = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("import "))?;
    if line.chars().count() <= EXCERPT_CHARS {
        return Some(line.to_string());
    }
    let truncated: String = line.chars().take(EXCERPT_CHARS).collect();
    Some(format!("{}…", truncated.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_by_extension_and_glob() {
        let filter = CollectionFilter::new(&CollectionConfig::default(), None).expect("filter");
        assert!(filter.matches("post.md"));
        assert!(filter.matches("Post.MDX"));
        assert!(!filter.matches("image.png"));
        assert!(!filter.matches("README"));
        assert!(!filter.matches(".md"));

        let globbed =
            CollectionFilter::new(&CollectionConfig::default(), Some("2024-*")).expect("filter");
        assert!(globbed.matches("2024-launch.md"));
        assert!(!globbed.matches("2023-recap.md"));
    }

    #[test]
    fn bad_glob_is_invalid_input() {
        let err = CollectionFilter::new(&CollectionConfig::default(), Some("[")).expect_err("glob");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn index_detection() {
        let filter = CollectionFilter::default();
        assert!(filter.is_index("index.md", None));
        let mut fm = FrontMatter::default();
        fm.metadata
            .insert("slug".to_string(), Value::String("index".to_string()));
        assert!(filter.is_index("home.md", Some(&fm)));
        assert!(!filter.is_index("home.md", None));
    }

    #[test]
    fn titles_fall_back_to_name() {
        assert_eq!(title_from_name("my-first_post.md"), "My first post");
        assert_eq!(title_from_name("notes"), "Notes");
    }

    #[test]
    fn item_prefers_metadata() {
        let mut fm = FrontMatter {
            body: "\n# Heading\n\nFirst line of text.\n".to_string(),
            ..FrontMatter::default()
        };
        let item = build_item("a-b.md".into(), "posts/a-b.md".into(), "r1".into(), fm.clone());
        assert_eq!(item.title, "A b");
        assert_eq!(item.excerpt.as_deref(), Some("First line of text."));

        fm.metadata
            .insert("title".to_string(), Value::String("Real Title".to_string()));
        fm.metadata
            .insert("excerpt".to_string(), Value::String("Teaser".to_string()));
        let item = build_item("a-b.md".into(), "posts/a-b.md".into(), "r1".into(), fm);
        assert_eq!(item.title, "Real Title");
        assert_eq!(item.excerpt.as_deref(), Some("Teaser"));
    }
}
