#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use folio::api::Editor;
use folio::config::{Config, StoreBackend};
use folio::locator::RepositoryRef;
use folio::resource::{AuthorIdentity, ResourceId, Revision, WriteOutcome};
use folio::store::git::GitStore;
use folio::store::RemoteStore;
use folio::writer::ConflictSafeWriter;
use tempfile::TempDir;

pub const REPO: &str = "acme/site";
pub const BRANCH: &str = "main";

/// A git-backed store in a temp directory with one initialized repository.
pub struct TestStore {
    dir: TempDir,
    store: Arc<GitStore>,
    repo: RepositoryRef,
}

impl TestStore {
    pub fn init() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let store = GitStore::new(dir.path().join("repos"));
        let repo = RepositoryRef::parse(REPO).expect("repo");
        store
            .init_repository(&repo, BRANCH, &author())
            .expect("init repository");
        Self {
            dir,
            store: Arc::new(store),
            repo,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_root(&self) -> PathBuf {
        self.dir.path().join("repos")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn repo(&self) -> &RepositoryRef {
        &self.repo
    }

    pub fn store(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }

    pub fn git_store(&self) -> &GitStore {
        &self.store
    }

    pub fn id(&self, path: &str) -> ResourceId {
        ResourceId::new(self.repo.clone(), BRANCH, path).expect("resource id")
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Git;
        config.store.git_root = Some(self.git_root());
        config.staging.state_dir = Some(self.state_dir());
        config
    }

    pub fn editor(&self) -> Editor {
        Editor::new(self.store(), &self.config())
    }

    pub fn writer(&self) -> ConflictSafeWriter {
        ConflictSafeWriter::new(self.store())
    }

    /// Create `path` with `content` as a new file.
    pub async fn seed(&self, path: &str, content: &str) -> WriteOutcome {
        self.writer()
            .write(&self.id(path), content, None, &format!("Add {path}"), &author())
            .await
            .expect("seed write")
    }

    /// Overwrite `path` with `content` on top of `base`.
    pub async fn update(&self, path: &str, content: &str, base: &Revision) -> WriteOutcome {
        self.writer()
            .write(
                &self.id(path),
                content,
                Some(base),
                &format!("Update {path}"),
                &author(),
            )
            .await
            .expect("update write")
    }

    /// Write a `.folio.toml` pointing at this store and return its path.
    pub fn write_config(&self) -> PathBuf {
        let path = self.dir.path().join(".folio.toml");
        let contents = format!(
            "branch = \"{BRANCH}\"\n\n[store]\nbackend = \"git\"\ngit_root = {:?}\n\n[author]\nname = \"CLI Tester\"\nemail = \"cli@example.com\"\n\n[staging]\nstate_dir = {:?}\n",
            self.git_root().display().to_string(),
            self.state_dir().display().to_string(),
        );
        fs::write(&path, contents).expect("write config");
        path
    }
}

pub fn author() -> AuthorIdentity {
    AuthorIdentity::new("Test Editor", "editor@example.com")
}
