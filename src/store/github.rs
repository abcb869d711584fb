//! Hosted repository backend speaking the GitHub REST API.
//!
//! Endpoints used:
//! - `GET  /repos/{owner}/{repo}/contents/{path}?ref=`
//! - `PUT  /repos/{owner}/{repo}/contents/{path}`
//! - `DELETE /repos/{owner}/{repo}/contents/{path}`
//! - `GET  /repos/{owner}/{repo}/commits?path=&sha=&per_page=`
//! - `GET  /user/repos`

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    DeleteContent, DeleteOutcome, EntryKind, PutContent, RemoteContent, RemoteEntry, RemoteFile,
    RemoteStore,
};
use crate::error::{Error, Result};
use crate::locator::RepositoryRef;
use crate::resource::{
    AuthorIdentity, CommitAuthor, CommitRecord, RepositorySummary, Revision, WriteOutcome,
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";
const MAX_PER_PAGE: usize = 100;

/// REST client for a hosted repository service.
pub struct GitHubStore {
    api_base: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl GitHubStore {
    pub fn new(api_base: &str, token: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let api_base = Url::parse(api_base).map_err(|err| {
            Error::InvalidConfig(format!("invalid store.api_base '{api_base}': {err}"))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "store.api_base '{api_base}' cannot carry a path"
            )));
        }

        let mut builder =
            reqwest::Client::builder().user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_base,
            token,
            client: builder.build()?,
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments.into_iter().filter(|segment| !segment.is_empty()));
        }
        url
    }

    fn contents_url(&self, repo: &RepositoryRef, path: &str) -> Url {
        let base = ["repos", repo.owner(), repo.name(), "contents"];
        self.endpoint(base.into_iter().chain(path.split('/')))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, HeaderValue::from_static(MEDIA_TYPE))
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        op: &'static str,
        path: &str,
        reference: &str,
    ) -> Result<Response> {
        debug!(op, path, reference, "remote store request");
        let response = builder.send().await.map_err(|err| {
            warn!(op, path, reference, error = %err, "remote store unreachable");
            Error::Http(err)
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim() == "0")
            .unwrap_or(false);
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(op, path, reference, status, %message, "remote store rejected request");
        Err(map_status(status, rate_limited, path, reference, message))
    }
}

#[async_trait]
impl RemoteStore for GitHubStore {
    async fn get_content(
        &self,
        repo: &RepositoryRef,
        path: &str,
        reference: &str,
    ) -> Result<RemoteContent> {
        let mut url = self.contents_url(repo, path);
        url.query_pairs_mut().append_pair("ref", reference);
        let response = self
            .send(self.request(Method::GET, url), "get_content", path, reference)
            .await?;
        let body = response.text().await?;
        parse_contents(&body)
    }

    async fn list_commits(
        &self,
        repo: &RepositoryRef,
        path: &str,
        reference: &str,
        limit: usize,
    ) -> Result<Vec<CommitRecord>> {
        let mut url = self.endpoint(["repos", repo.owner(), repo.name(), "commits"]);
        url.query_pairs_mut()
            .append_pair("sha", reference)
            .append_pair("per_page", &limit.clamp(1, MAX_PER_PAGE).to_string());
        if !path.is_empty() {
            url.query_pairs_mut().append_pair("path", path);
        }
        let response = self
            .send(self.request(Method::GET, url), "list_commits", path, reference)
            .await?;
        let body = response.text().await?;
        let mut commits = parse_commits(&body)?;
        commits.truncate(limit);
        Ok(commits)
    }

    async fn put_content(
        &self,
        repo: &RepositoryRef,
        request: &PutContent,
    ) -> Result<WriteOutcome> {
        let payload = PutBody {
            message: &request.message,
            content: BASE64.encode(&request.content),
            branch: &request.branch,
            sha: request.base_revision.as_ref().map(Revision::as_str),
            author: SignaturePayload::from(&request.author),
            committer: SignaturePayload::from(&request.author),
        };
        let url = self.contents_url(repo, &request.path);
        let response = self
            .send(
                self.request(Method::PUT, url).json(&payload),
                "put_content",
                &request.path,
                &request.branch,
            )
            .await?;
        let body: PutResponse = serde_json::from_str(&response.text().await?)?;
        Ok(WriteOutcome {
            revision: Revision::new(body.content.sha),
            commit_sha: body.commit.sha,
        })
    }

    async fn delete_content(
        &self,
        repo: &RepositoryRef,
        request: &DeleteContent,
    ) -> Result<DeleteOutcome> {
        let payload = DeleteBody {
            message: &request.message,
            sha: request.revision.as_str(),
            branch: &request.branch,
            author: SignaturePayload::from(&request.author),
            committer: SignaturePayload::from(&request.author),
        };
        let url = self.contents_url(repo, &request.path);
        let response = self
            .send(
                self.request(Method::DELETE, url).json(&payload),
                "delete_content",
                &request.path,
                &request.branch,
            )
            .await?;
        let body: DeleteResponse = serde_json::from_str(&response.text().await?)?;
        Ok(DeleteOutcome {
            commit_sha: body.commit.sha,
        })
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        let mut repositories = Vec::new();
        let mut page = 1usize;
        loop {
            let mut url = self.endpoint(["user", "repos"]);
            url.query_pairs_mut()
                .append_pair("per_page", &MAX_PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            let response = self
                .send(self.request(Method::GET, url), "list_repositories", "", "")
                .await?;
            let batch = parse_repositories(&response.text().await?)?;
            let done = batch.len() < MAX_PER_PAGE;
            repositories.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(repositories)
    }
}

/// Map a non-success status onto the error taxonomy.
pub(crate) fn map_status(
    status: u16,
    rate_limited: bool,
    path: &str,
    reference: &str,
    message: String,
) -> Error {
    match status {
        401 => Error::AuthFailure(message),
        403 if rate_limited => Error::RateLimited(message),
        403 => Error::PermissionDenied(message),
        404 => Error::not_found(path, reference),
        409 => Error::conflict(path, message),
        // The API answers 422 when `sha` is missing or malformed for an existing file.
        422 if message.to_ascii_lowercase().contains("sha") => Error::conflict(path, message),
        422 => Error::InvalidInput(message),
        429 => Error::RateLimited(message),
        _ => Error::Remote { status, message },
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => err.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(400).collect()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Directory(Vec<ContentsEntry>),
    Single(ContentsEntry),
}

#[derive(Deserialize)]
struct ContentsEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

fn entry_kind(raw: &str) -> EntryKind {
    match raw {
        "dir" => EntryKind::Dir,
        "symlink" => EntryKind::Symlink,
        "submodule" => EntryKind::Submodule,
        _ => EntryKind::File,
    }
}

/// Resolve the two response shapes of a contents lookup.
pub(crate) fn parse_contents(body: &str) -> Result<RemoteContent> {
    match serde_json::from_str::<ContentsResponse>(body)? {
        ContentsResponse::Directory(entries) => Ok(RemoteContent::Directory(
            entries
                .into_iter()
                .map(|entry| RemoteEntry {
                    kind: entry_kind(&entry.kind),
                    name: entry.name,
                    path: entry.path,
                    revision: Revision::new(entry.sha),
                    size: entry.size,
                })
                .collect(),
        )),
        ContentsResponse::Single(entry) => Ok(RemoteContent::File(RemoteFile {
            name: entry.name,
            path: entry.path,
            content: entry.content.unwrap_or_default(),
            // Large files and symlinks come back without a usable encoding.
            encoding: entry.encoding.unwrap_or_else(|| "none".to_string()),
            revision: Revision::new(entry.sha),
            size: entry.size,
        })),
    }
}

#[derive(Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitBody,
}

#[derive(Deserialize)]
struct CommitBody {
    message: String,
    author: Option<GitActor>,
    committer: Option<GitActor>,
}

#[derive(Deserialize)]
struct GitActor {
    name: String,
    email: String,
    date: DateTime<Utc>,
}

pub(crate) fn parse_commits(body: &str) -> Result<Vec<CommitRecord>> {
    let items: Vec<CommitItem> = serde_json::from_str(body)?;
    items
        .into_iter()
        .map(|item| {
            let actor = item
                .commit
                .author
                .or(item.commit.committer)
                .ok_or_else(|| {
                    Error::OperationFailed(format!("commit {} has no author", item.sha))
                })?;
            Ok(CommitRecord {
                sha: item.sha,
                message: item.commit.message,
                author: CommitAuthor {
                    name: actor.name,
                    email: actor.email,
                    date: actor.date,
                },
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct RepositoryItem {
    full_name: String,
    owner: OwnerItem,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    visibility: Option<String>,
}

#[derive(Deserialize)]
struct OwnerItem {
    login: String,
}

pub(crate) fn parse_repositories(body: &str) -> Result<Vec<RepositorySummary>> {
    let items: Vec<RepositoryItem> = serde_json::from_str(body)?;
    Ok(items
        .into_iter()
        .map(|item| RepositorySummary {
            full_name: item.full_name,
            owner: item.owner.login,
            default_branch: item.default_branch.unwrap_or_else(|| "main".to_string()),
            visibility: item.visibility.unwrap_or_else(|| {
                if item.private { "private" } else { "public" }.to_string()
            }),
        })
        .collect())
}

#[derive(Serialize)]
struct SignaturePayload<'a> {
    name: &'a str,
    email: &'a str,
}

impl<'a> From<&'a AuthorIdentity> for SignaturePayload<'a> {
    fn from(author: &'a AuthorIdentity) -> Self {
        Self {
            name: &author.name,
            email: &author.email,
        }
    }
}

#[derive(Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    author: SignaturePayload<'a>,
    committer: SignaturePayload<'a>,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
    author: SignaturePayload<'a>,
    committer: SignaturePayload<'a>,
}

#[derive(Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Deserialize)]
struct PutResponse {
    content: ShaOnly,
    commit: ShaOnly,
}

#[derive(Deserialize)]
struct DeleteResponse {
    commit: ShaOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_url_encodes_segments() {
        let store = GitHubStore::new(DEFAULT_API_BASE, None, None).expect("store");
        let repo = RepositoryRef::parse("acme/site").expect("repo");
        let url = store.contents_url(&repo, "posts/hello world.md");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/site/contents/posts/hello%20world.md"
        );
    }

    #[test]
    fn enterprise_base_keeps_prefix() {
        let store = GitHubStore::new("https://git.example.com/api/v3/", None, None).expect("store");
        let url = store.endpoint(["user", "repos"]);
        assert_eq!(url.as_str(), "https://git.example.com/api/v3/user/repos");
    }

    #[test]
    fn invalid_base_is_config_error() {
        let err = GitHubStore::new("not a url", None, None).err().expect("error");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn file_response_parses_to_file() {
        let body = r#"{
            "type": "file", "name": "p.md", "path": "posts/p.md",
            "sha": "r1", "size": 2, "content": "WA==\n", "encoding": "base64"
        }"#;
        match parse_contents(body).expect("parse") {
            RemoteContent::File(file) => {
                assert_eq!(file.revision, Revision::new("r1"));
                assert_eq!(file.encoding, "base64");
                assert_eq!(file.content, "WA==\n");
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn array_response_parses_to_directory() {
        let body = r#"[
            {"type": "file", "name": "a.md", "path": "posts/a.md", "sha": "1", "size": 10},
            {"type": "dir", "name": "img", "path": "posts/img", "sha": "2", "size": 0}
        ]"#;
        match parse_contents(body).expect("parse") {
            RemoteContent::Directory(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].kind, EntryKind::File);
                assert_eq!(entries[1].kind, EntryKind::Dir);
            }
            other => panic!("expected directory, got {other:?}"),
        }
    }

    #[test]
    fn missing_encoding_is_reported_as_none() {
        let body = r#"{"type": "file", "name": "big.json", "path": "big.json", "sha": "x", "size": 5000000, "content": "", "encoding": null}"#;
        match parse_contents(body).expect("parse") {
            RemoteContent::File(file) => assert_eq!(file.encoding, "none"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn statuses_map_to_taxonomy() {
        let msg = || "m".to_string();
        assert!(matches!(map_status(401, false, "p", "main", msg()), Error::AuthFailure(_)));
        assert!(matches!(map_status(403, false, "p", "main", msg()), Error::PermissionDenied(_)));
        assert!(matches!(map_status(403, true, "p", "main", msg()), Error::RateLimited(_)));
        assert!(matches!(map_status(404, false, "p", "main", msg()), Error::NotFound { .. }));
        assert!(matches!(map_status(409, false, "p", "main", msg()), Error::Conflict { .. }));
        assert!(matches!(
            map_status(422, false, "p", "main", "\"sha\" wasn't supplied.".to_string()),
            Error::Conflict { .. }
        ));
        assert!(matches!(map_status(422, false, "p", "main", msg()), Error::InvalidInput(_)));
        assert!(matches!(map_status(429, false, "p", "main", msg()), Error::RateLimited(_)));
        assert!(matches!(
            map_status(502, false, "p", "main", msg()),
            Error::Remote { status: 502, .. }
        ));
    }

    #[test]
    fn error_message_prefers_api_message() {
        assert_eq!(error_message(r#"{"message": "Bad credentials"}"#), "Bad credentials");
        assert_eq!(error_message("  "), "no response body");
        assert_eq!(error_message("<html>oops</html>"), "<html>oops</html>");
    }

    #[test]
    fn commits_parse_author_and_message() {
        let body = r#"[{
            "sha": "c2",
            "commit": {
                "message": "Update p.md\n\nbody",
                "author": {"name": "Ada", "email": "ada@example.com", "date": "2024-05-01T10:00:00Z"},
                "committer": {"name": "Bot", "email": "bot@example.com", "date": "2024-05-01T10:00:01Z"}
            }
        }]"#;
        let commits = parse_commits(body).expect("parse");
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].author.name, "Ada");
        assert_eq!(commits[0].summary(), "Update p.md");
    }

    #[test]
    fn repositories_parse_visibility() {
        let body = r#"[
            {"full_name": "acme/site", "owner": {"login": "acme"}, "default_branch": "main", "private": true},
            {"full_name": "acme/docs", "owner": {"login": "acme"}, "default_branch": "trunk", "visibility": "internal"}
        ]"#;
        let repos = parse_repositories(body).expect("parse");
        assert_eq!(repos[0].visibility, "private");
        assert_eq!(repos[1].visibility, "internal");
        assert_eq!(repos[1].default_branch, "trunk");
    }
}
