//! Markdown front-matter decoding.
//!
//! The collection accessor only depends on [`FrontMatterDecoder`];
//! [`YamlFrontMatter`] is the default implementation.

use serde_json::{Map, Value};

use crate::error::Result;

/// Metadata block and remaining body of a markdown document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub metadata: Map<String, Value>,
    pub body: String,
}

impl FrontMatter {
    /// String value of a metadata field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Decodes raw markdown into front-matter and body.
pub trait FrontMatterDecoder: Send + Sync {
    fn decode(&self, raw: &str) -> Result<FrontMatter>;
}

/// `---` delimited YAML front-matter.
///
/// Malformed YAML yields empty metadata rather than an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFrontMatter;

impl FrontMatterDecoder for YamlFrontMatter {
    fn decode(&self, raw: &str) -> Result<FrontMatter> {
        let Some((yaml, body)) = split_front_matter(raw) else {
            return Ok(FrontMatter {
                metadata: Map::new(),
                body: raw.to_string(),
            });
        };

        let metadata = if yaml.trim().is_empty() {
            Map::new()
        } else {
            match serde_yaml_ng::from_str::<Map<String, Value>>(yaml) {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::debug!(error = %err, "front-matter is not a YAML mapping");
                    Map::new()
                }
            }
        };

        Ok(FrontMatter {
            metadata,
            body: body.to_string(),
        })
    }
}

/// Split `---\n<yaml>\n---\n<body>`; `None` when there is no complete block.
fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let rest = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))?;

    if let Some(body) = rest.strip_prefix("---\n").or_else(|| rest.strip_prefix("---\r\n")) {
        return Some(("", body));
    }

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_yaml_block() {
        let doc = "---\ntitle: Hello\ntags:\n  - a\n  - b\ndraft: true\n---\n\nBody text\n";
        let fm = YamlFrontMatter.decode(doc).expect("decode");
        assert_eq!(fm.get_str("title"), Some("Hello"));
        assert_eq!(fm.metadata["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(fm.metadata["draft"], Value::Bool(true));
        assert_eq!(fm.body, "\nBody text\n");
    }

    #[test]
    fn crlf_delimiters() {
        let doc = "---\r\nslug: index\r\n---\r\nBody";
        let fm = YamlFrontMatter.decode(doc).expect("decode");
        assert_eq!(fm.get_str("slug"), Some("index"));
        assert_eq!(fm.body, "Body");
    }

    #[test]
    fn missing_block_keeps_whole_body() {
        let fm = YamlFrontMatter.decode("# Title\n\ntext").expect("decode");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "# Title\n\ntext");

        let unterminated = YamlFrontMatter.decode("---\ntitle: x\n").expect("decode");
        assert!(unterminated.metadata.is_empty());
    }

    #[test]
    fn malformed_yaml_gives_empty_metadata() {
        let fm = YamlFrontMatter
            .decode("---\ntitle: [unclosed\n---\nBody")
            .expect("decode");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "Body");

        let scalar = YamlFrontMatter.decode("---\njust text\n---\n").expect("decode");
        assert!(scalar.metadata.is_empty());
    }

    #[test]
    fn empty_block() {
        let fm = YamlFrontMatter.decode("---\n---\nBody").expect("decode");
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "Body");
    }
}
