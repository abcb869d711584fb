//! Local repository backend built on libgit2.
//!
//! Repositories live under a root directory as `<root>/<owner>/<name>`
//! (bare repositories are expected; a checked-out worktree is not updated).
//! The backend follows the hosted contract exactly:
//! - a file's revision is its blob id
//! - writes compare the caller's base revision with the current blob id
//! - the branch tip only moves if it still points at the commit the write was
//!   built on; when another write lands first, the path is checked again
//!   against the new tip, so a commit is never dropped and unrelated paths
//!   never conflict

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use git2::{Commit, ErrorCode, FileMode, ObjectType, Oid, Repository, Signature, Sort, Tree};
use tracing::{debug, info};

use super::{
    DeleteContent, DeleteOutcome, EntryKind, PutContent, RemoteContent, RemoteEntry, RemoteFile,
    RemoteStore, BASE64_ENCODING,
};
use crate::error::{Error, Result};
use crate::locator::RepositoryRef;
use crate::resource::{
    AuthorIdentity, CommitAuthor, CommitRecord, RepositorySummary, Revision, WriteOutcome,
};

/// Store backed by repositories on the local filesystem.
#[derive(Debug, Clone)]
pub struct GitStore {
    root: PathBuf,
}

impl GitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the repository for `repo`.
    pub fn repository_path(&self, repo: &RepositoryRef) -> PathBuf {
        self.root.join(repo.owner()).join(repo.name())
    }

    /// Create a bare repository with an empty initial commit on `branch`.
    pub fn init_repository(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        author: &AuthorIdentity,
    ) -> Result<PathBuf> {
        let path = self.repository_path(repo);
        std::fs::create_dir_all(&path)?;
        let repository = Repository::init_bare(&path)?;
        let refname = branch_refname(branch);
        repository.set_head(&refname)?;

        let tree_id = repository.treebuilder(None)?.write()?;
        let tree = repository.find_tree(tree_id)?;
        let signature = signature(author)?;
        repository.commit(
            Some(&refname),
            &signature,
            &signature,
            "Initial commit",
            &tree,
            &[],
        )?;
        Ok(path)
    }

    async fn with_repository<T, F>(&self, repo: &RepositoryRef, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let path = self.repository_path(repo);
        let label = repo.to_string();
        tokio::task::spawn_blocking(move || {
            let repository = open_repository(&path, &label)?;
            work(&repository)
        })
        .await
        .map_err(|err| Error::OperationFailed(format!("git task failed: {err}")))?
    }
}

#[async_trait]
impl RemoteStore for GitStore {
    async fn get_content(
        &self,
        repo: &RepositoryRef,
        path: &str,
        reference: &str,
    ) -> Result<RemoteContent> {
        let path = path.to_string();
        let reference = reference.to_string();
        self.with_repository(repo, move |repository| {
            read_content(repository, &path, &reference)
        })
        .await
    }

    async fn list_commits(
        &self,
        repo: &RepositoryRef,
        path: &str,
        reference: &str,
        limit: usize,
    ) -> Result<Vec<CommitRecord>> {
        let path = path.to_string();
        let reference = reference.to_string();
        self.with_repository(repo, move |repository| {
            commits_touching(repository, &path, &reference, limit)
        })
        .await
    }

    async fn put_content(
        &self,
        repo: &RepositoryRef,
        request: &PutContent,
    ) -> Result<WriteOutcome> {
        let request = request.clone();
        self.with_repository(repo, move |repository| put_file(repository, &request))
            .await
    }

    async fn delete_content(
        &self,
        repo: &RepositoryRef,
        request: &DeleteContent,
    ) -> Result<DeleteOutcome> {
        let request = request.clone();
        self.with_repository(repo, move |repository| delete_file(repository, &request))
            .await
    }

    async fn list_repositories(&self) -> Result<Vec<RepositorySummary>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_repositories(&root))
            .await
            .map_err(|err| Error::OperationFailed(format!("git task failed: {err}")))?
    }
}

fn open_repository(path: &Path, label: &str) -> Result<Repository> {
    Repository::open(path).map_err(|err| {
        if err.code() == ErrorCode::NotFound {
            Error::not_found(label, "repository")
        } else {
            Error::Git(err)
        }
    })
}

fn branch_refname(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

fn signature(author: &AuthorIdentity) -> Result<Signature<'static>> {
    Ok(Signature::now(&author.name, &author.email)?)
}

fn resolve_commit<'r>(repo: &'r Repository, reference: &str, path: &str) -> Result<Commit<'r>> {
    let object = repo.revparse_single(reference).map_err(|err| match err.code() {
        ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
            Error::not_found(path, reference)
        }
        _ => Error::Git(err),
    })?;
    object
        .peel_to_commit()
        .map_err(|_| Error::not_found(path, reference))
}

fn branch_tip<'r>(repo: &'r Repository, branch: &str, path: &str) -> Result<Commit<'r>> {
    let reference = repo
        .find_reference(&branch_refname(branch))
        .map_err(|err| {
            if err.code() == ErrorCode::NotFound {
                Error::not_found(path, branch)
            } else {
                Error::Git(err)
            }
        })?;
    Ok(reference.peel_to_commit()?)
}

/// Tree entry id at `path`, or `None` if nothing is there.
fn entry_at(tree: &Tree<'_>, path: &str) -> Result<Option<(Oid, Option<ObjectType>)>> {
    if path.is_empty() {
        return Ok(Some((tree.id(), Some(ObjectType::Tree))));
    }
    match tree.get_path(Path::new(path)) {
        Ok(entry) => Ok(Some((entry.id(), entry.kind()))),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(Error::Git(err)),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn list_tree(repo: &Repository, tree: &Tree<'_>, parent: &str) -> Result<Vec<RemoteEntry>> {
    let mut entries = Vec::with_capacity(tree.len());
    for entry in tree.iter() {
        let name = String::from_utf8_lossy(entry.name_bytes()).to_string();
        let (kind, size) = match entry.kind() {
            Some(ObjectType::Blob) => {
                let size = repo.find_blob(entry.id())?.size() as u64;
                if entry.filemode() == i32::from(FileMode::Link) {
                    (EntryKind::Symlink, size)
                } else {
                    (EntryKind::File, size)
                }
            }
            Some(ObjectType::Tree) => (EntryKind::Dir, 0),
            _ => (EntryKind::Submodule, 0),
        };
        entries.push(RemoteEntry {
            path: join_path(parent, &name),
            name,
            kind,
            revision: Revision::new(entry.id().to_string()),
            size,
        });
    }
    Ok(entries)
}

fn read_content(repo: &Repository, path: &str, reference: &str) -> Result<RemoteContent> {
    let commit = resolve_commit(repo, reference, path)?;
    let tree = commit.tree()?;

    match entry_at(&tree, path)? {
        None => Err(Error::not_found(path, reference)),
        Some((id, Some(ObjectType::Tree))) => {
            let subtree = repo.find_tree(id)?;
            Ok(RemoteContent::Directory(list_tree(repo, &subtree, path)?))
        }
        Some((id, Some(ObjectType::Blob))) => {
            let blob = repo.find_blob(id)?;
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            Ok(RemoteContent::File(RemoteFile {
                name,
                path: path.to_string(),
                content: BASE64.encode(blob.content()),
                encoding: BASE64_ENCODING.to_string(),
                revision: Revision::new(id.to_string()),
                size: blob.size() as u64,
            }))
        }
        Some(_) => Err(Error::NotAFile(path.to_string())),
    }
}

/// Current blob id at `path`; a directory there is not writable as a file.
fn current_blob(tree: &Tree<'_>, path: &str) -> Result<Option<Oid>> {
    match entry_at(tree, path)? {
        None => Ok(None),
        Some((id, Some(ObjectType::Blob))) => Ok(Some(id)),
        Some(_) => Err(Error::NotAFile(path.to_string())),
    }
}

fn check_base(
    path: &str,
    branch: &str,
    current: Option<Oid>,
    base: Option<&Revision>,
) -> Result<()> {
    match (current, base) {
        (None, None) => Ok(()),
        (Some(current), Some(base)) if current.to_string() == base.as_str() => Ok(()),
        (Some(current), Some(base)) => Err(Error::conflict(
            path,
            format!("base revision {base} is stale; current revision is {current}"),
        )),
        (Some(current), None) => Err(Error::conflict(
            path,
            format!("resource already exists at revision {current}; a base revision is required"),
        )),
        (None, Some(_)) => Err(Error::not_found(path, branch)),
    }
}

/// Rebuild the tree along `segments`, placing `leaf` at the end (or removing
/// it when `None`). Returns `None` when the rebuilt tree is empty.
fn rewrite_tree(
    repo: &Repository,
    base: Option<&Tree<'_>>,
    segments: &[&str],
    leaf: Option<Oid>,
) -> Result<Option<Oid>> {
    let (&head, rest) = segments
        .split_first()
        .ok_or_else(|| Error::InvalidInput("path cannot be empty".to_string()))?;
    let mut builder = repo.treebuilder(base)?;
    let existing = base.and_then(|tree| tree.get_name(head));

    if rest.is_empty() {
        match leaf {
            Some(blob) => {
                let mode = existing
                    .as_ref()
                    .map(|entry| entry.filemode())
                    .filter(|mode| *mode == i32::from(FileMode::BlobExecutable))
                    .unwrap_or_else(|| i32::from(FileMode::Blob));
                builder.insert(head, blob, mode)?;
            }
            None => {
                if existing.is_some() {
                    builder.remove(head)?;
                }
            }
        }
    } else {
        let subtree = match &existing {
            Some(entry) if entry.kind() == Some(ObjectType::Tree) => {
                Some(repo.find_tree(entry.id())?)
            }
            Some(_) => {
                return Err(Error::InvalidInput(format!(
                    "'{head}' is a file and cannot contain other paths"
                )))
            }
            None => None,
        };
        match rewrite_tree(repo, subtree.as_ref(), rest, leaf)? {
            Some(id) => {
                builder.insert(head, id, i32::from(FileMode::Tree))?;
            }
            None => {
                if existing.is_some() {
                    builder.remove(head)?;
                }
            }
        }
    }

    if builder.len() == 0 {
        return Ok(None);
    }
    Ok(Some(builder.write()?))
}

/// Attempts at advancing a branch whose tip keeps moving under a write.
const MAX_BRANCH_ATTEMPTS: u32 = 64;

/// Result of trying to advance a branch from an expected tip.
enum BranchUpdate {
    Advanced(Oid),
    Moved,
}

/// Commit `tree_id` on top of `parent` and advance the branch only if it still
/// points at `parent`.
fn commit_on_branch(
    repo: &Repository,
    branch: &str,
    parent: &Commit<'_>,
    tree_id: Oid,
    message: &str,
    author: &AuthorIdentity,
) -> Result<BranchUpdate> {
    let tree = repo.find_tree(tree_id)?;
    let signature = signature(author)?;
    let commit_id = repo.commit(None, &signature, &signature, message, &tree, &[parent])?;

    let summary = message.lines().next().unwrap_or_default();
    match repo.reference_matching(
        &branch_refname(branch),
        commit_id,
        true,
        parent.id(),
        &format!("folio: {summary}"),
    ) {
        Ok(_) => Ok(BranchUpdate::Advanced(commit_id)),
        Err(err) if matches!(err.code(), ErrorCode::Modified | ErrorCode::Locked) => {
            Ok(BranchUpdate::Moved)
        }
        Err(err) => Err(Error::Git(err)),
    }
}

/// Re-check `path` against the current tip and commit `leaf` there, starting
/// over whenever another writer advances the branch first.
///
/// Only the path's own blob decides a conflict; commits to other paths just
/// move the parent.
fn write_path(
    repo: &Repository,
    branch: &str,
    path: &str,
    leaf: Option<Oid>,
    base: Option<&Revision>,
    message: &str,
    author: &AuthorIdentity,
) -> Result<Oid> {
    for attempt in 0..MAX_BRANCH_ATTEMPTS {
        let parent = branch_tip(repo, branch, path)?;
        let tree = parent.tree()?;
        let current = current_blob(&tree, path)?;
        check_base(path, branch, current, base)?;

        let tree_id = root_tree_after(repo, &tree, path, leaf)?;
        match commit_on_branch(repo, branch, &parent, tree_id, message, author)? {
            BranchUpdate::Advanced(commit_id) => return Ok(commit_id),
            BranchUpdate::Moved => {
                debug!(path, branch, attempt, "branch moved, re-checking base");
                std::thread::sleep(Duration::from_millis(u64::from(attempt.min(10)) + 1));
            }
        }
    }
    Err(Error::OperationFailed(format!(
        "branch {branch} kept moving; gave up after {MAX_BRANCH_ATTEMPTS} attempts"
    )))
}

fn root_tree_after(
    repo: &Repository,
    tree: &Tree<'_>,
    path: &str,
    leaf: Option<Oid>,
) -> Result<Oid> {
    let segments: Vec<&str> = path.split('/').collect();
    match rewrite_tree(repo, Some(tree), &segments, leaf)? {
        Some(id) => Ok(id),
        None => Ok(repo.treebuilder(None)?.write()?),
    }
}

fn put_file(repo: &Repository, request: &PutContent) -> Result<WriteOutcome> {
    if request.path.is_empty() {
        return Err(Error::NotAFile("/".to_string()));
    }
    let blob = repo.blob(&request.content)?;
    let commit_id = write_path(
        repo,
        &request.branch,
        &request.path,
        Some(blob),
        request.base_revision.as_ref(),
        &request.message,
        &request.author,
    )?;

    info!(
        path = %request.path,
        branch = %request.branch,
        commit = %commit_id,
        "committed content"
    );
    Ok(WriteOutcome {
        revision: Revision::new(blob.to_string()),
        commit_sha: commit_id.to_string(),
    })
}

fn delete_file(repo: &Repository, request: &DeleteContent) -> Result<DeleteOutcome> {
    let commit_id = write_path(
        repo,
        &request.branch,
        &request.path,
        None,
        Some(&request.revision),
        &request.message,
        &request.author,
    )?;

    info!(path = %request.path, branch = %request.branch, commit = %commit_id, "deleted content");
    Ok(DeleteOutcome {
        commit_sha: commit_id.to_string(),
    })
}

fn commit_record(commit: &Commit<'_>) -> CommitRecord {
    let author = commit.author();
    CommitRecord {
        sha: commit.id().to_string(),
        message: commit.message().unwrap_or_default().to_string(),
        author: CommitAuthor {
            name: author.name().unwrap_or_default().to_string(),
            email: author.email().unwrap_or_default().to_string(),
            date: DateTime::<Utc>::from_timestamp(author.when().seconds(), 0).unwrap_or_default(),
        },
    }
}

/// Whether `commit` changed `path` relative to every parent.
fn touches_path(commit: &Commit<'_>, path: &str) -> Result<bool> {
    if path.is_empty() {
        return Ok(true);
    }
    let current = entry_at(&commit.tree()?, path)?.map(|(id, _)| id);
    if commit.parent_count() == 0 {
        return Ok(current.is_some());
    }
    for parent in commit.parents() {
        let previous = entry_at(&parent.tree()?, path)?.map(|(id, _)| id);
        if previous == current {
            return Ok(false);
        }
    }
    Ok(true)
}

fn commits_touching(
    repo: &Repository,
    path: &str,
    reference: &str,
    limit: usize,
) -> Result<Vec<CommitRecord>> {
    let start = resolve_commit(repo, reference, path)?;
    let mut revwalk = repo.revwalk()?;
    revwalk.push(start.id())?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut records = Vec::new();
    for oid in revwalk {
        if records.len() >= limit {
            break;
        }
        let commit = repo.find_commit(oid?)?;
        if touches_path(&commit, path)? {
            records.push(commit_record(&commit));
        }
    }
    debug!(path, reference, count = records.len(), "listed commits");
    Ok(records)
}

fn default_branch(repo: &Repository) -> String {
    repo.find_reference("HEAD")
        .ok()
        .and_then(|head| head.symbolic_target().map(str::to_string))
        .and_then(|target| target.strip_prefix("refs/heads/").map(str::to_string))
        .unwrap_or_else(|| "main".to_string())
}

fn scan_repositories(root: &Path) -> Result<Vec<RepositorySummary>> {
    let mut summaries = Vec::new();
    if !root.exists() {
        return Ok(summaries);
    }

    for owner in std::fs::read_dir(root)? {
        let owner = owner?;
        if !owner.file_type()?.is_dir() {
            continue;
        }
        let owner_name = owner.file_name().to_string_lossy().to_string();
        for candidate in std::fs::read_dir(owner.path())? {
            let candidate = candidate?;
            let Ok(repo) = Repository::open(candidate.path()) else {
                continue;
            };
            let name = candidate.file_name().to_string_lossy().to_string();
            summaries.push(RepositorySummary {
                full_name: format!("{owner_name}/{name}"),
                owner: owner_name.clone(),
                default_branch: default_branch(&repo),
                visibility: "private".to_string(),
            });
        }
    }

    summaries.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitStore, RepositoryRef) {
        let temp = TempDir::new().unwrap();
        let store = GitStore::new(temp.path());
        let repo = RepositoryRef::parse("acme/site").unwrap();
        store
            .init_repository(&repo, "main", &AuthorIdentity::new("Test", "test@example.com"))
            .unwrap();
        (temp, store, repo)
    }

    fn put(path: &str, content: &str, base: Option<&Revision>) -> PutContent {
        PutContent {
            path: path.to_string(),
            content: content.as_bytes().to_vec(),
            message: format!("Write {path}"),
            branch: "main".to_string(),
            base_revision: base.cloned(),
            author: AuthorIdentity::new("Test", "test@example.com"),
        }
    }

    #[test]
    fn rewrite_tree_creates_nested_directories() {
        let (_temp, store, repo) = setup();
        let repository = Repository::open(store.repository_path(&repo)).unwrap();
        let blob = repository.blob(b"hello").unwrap();
        let tree_id = rewrite_tree(&repository, None, &["a", "b", "c.md"], Some(blob))
            .unwrap()
            .unwrap();
        let tree = repository.find_tree(tree_id).unwrap();
        let entry = tree.get_path(Path::new("a/b/c.md")).unwrap();
        assert_eq!(entry.id(), blob);
    }

    #[test]
    fn removing_last_file_prunes_empty_directories() {
        let (_temp, store, repo) = setup();
        let repository = Repository::open(store.repository_path(&repo)).unwrap();
        let blob = repository.blob(b"hello").unwrap();
        let with_file = rewrite_tree(&repository, None, &["docs", "a.md"], Some(blob))
            .unwrap()
            .unwrap();
        let tree = repository.find_tree(with_file).unwrap();
        let pruned = rewrite_tree(&repository, Some(&tree), &["docs", "a.md"], None).unwrap();
        assert!(pruned.is_none());
    }

    #[test]
    fn base_check_matrix() {
        let oid = Oid::from_str("0123456789012345678901234567890123456789").unwrap();
        let same = Revision::new(oid.to_string());
        let stale = Revision::new("deadbeef");
        assert!(check_base("a", "main", None, None).is_ok());
        assert!(check_base("a", "main", Some(oid), Some(&same)).is_ok());
        assert!(matches!(
            check_base("a", "main", Some(oid), Some(&stale)),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(
            check_base("a", "main", Some(oid), None),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(
            check_base("a", "main", None, Some(&stale)),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn put_then_get_round_trips_content() {
        let (_temp, store, repo) = setup();
        let outcome = store
            .put_content(&repo, &put("posts/p.md", "X", None))
            .await
            .unwrap();

        match store.get_content(&repo, "posts/p.md", "main").await.unwrap() {
            RemoteContent::File(file) => {
                assert_eq!(file.revision, outcome.revision);
                assert_eq!(BASE64.decode(file.content).unwrap(), b"X");
            }
            other => panic!("expected file, got {other:?}"),
        }

        match store.get_content(&repo, "posts", "main").await.unwrap() {
            RemoteContent::Directory(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].path, "posts/p.md");
            }
            other => panic!("expected directory, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_base_is_conflict() {
        let (_temp, store, repo) = setup();
        let first = store.put_content(&repo, &put("p.md", "X", None)).await.unwrap();
        store
            .put_content(&repo, &put("p.md", "Y", Some(&first.revision)))
            .await
            .unwrap();
        let err = store
            .put_content(&repo, &put("p.md", "Z", Some(&first.revision)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let (_temp, store, _repo) = setup();
        let other = RepositoryRef::parse("acme/missing").unwrap();
        let err = store.get_content(&other, "", "main").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn history_only_lists_commits_touching_path() {
        let (_temp, store, repo) = setup();
        let a = store.put_content(&repo, &put("a.md", "1", None)).await.unwrap();
        store.put_content(&repo, &put("b.md", "1", None)).await.unwrap();
        store
            .put_content(&repo, &put("a.md", "2", Some(&a.revision)))
            .await
            .unwrap();

        let commits = store.list_commits(&repo, "a.md", "main", 10).await.unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].sha, a.commit_sha);

        let limited = store.list_commits(&repo, "", "main", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn repositories_are_discovered_under_root() {
        let (_temp, store, _repo) = setup();
        let repos = store.list_repositories().await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].full_name, "acme/site");
        assert_eq!(repos[0].default_branch, "main");
    }
}
