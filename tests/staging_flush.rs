mod support;

use folio::api::{CommitRequest, Editor, ResourceRequest, StageRequest};
use folio::error::Error;
use folio::ledger_file::LedgerFile;
use folio::reader::RevisionReader;
use folio::resource::Revision;
use folio::staging::{self, Operation, StagingLedger};

use support::{author, TestStore, BRANCH, REPO};

fn request(path: &str) -> ResourceRequest {
    ResourceRequest::new(REPO, BRANCH, path)
}

fn stage_write(ledger: &mut StagingLedger, path: &str, content: &str, base: Option<&Revision>) {
    Editor::stage(
        ledger,
        &StageRequest {
            resource: request(path),
            content: Some(content.to_string()),
            delete: false,
            base_revision: base.cloned(),
        },
    )
    .expect("stage");
}

#[tokio::test]
async fn flush_commits_in_staging_order() {
    let env = TestStore::init();
    let editor = env.editor();
    let existing = env.seed("b.md", "old b").await;

    let mut ledger = StagingLedger::new();
    stage_write(&mut ledger, "a.md", "new a", None);
    stage_write(&mut ledger, "b.md", "new b", Some(&existing.revision));

    let summary = editor
        .flush(&mut ledger, "Publish drafts", &author())
        .await
        .expect("flush");
    assert!(summary.stopped_at.is_none());
    assert_eq!(summary.remaining, 0);
    assert!(ledger.is_empty());

    let paths: Vec<&str> = summary
        .committed
        .iter()
        .map(|change| change.resource.path.as_str())
        .collect();
    assert_eq!(paths, vec!["a.md", "b.md"]);
    assert_eq!(summary.committed[0].operation, Operation::Create);
    assert_eq!(summary.committed[1].operation, Operation::Update);

    let reader = RevisionReader::new(env.store());
    let (b, _) = reader.read_file(&env.id("b.md")).await.expect("read b");
    assert_eq!(b, "new b");
}

#[tokio::test]
async fn flush_stops_at_first_failure_and_keeps_the_rest() {
    let env = TestStore::init();
    let editor = env.editor();
    let first = env.seed("b.md", "v1").await;
    env.update("b.md", "v2", &first.revision).await;

    let mut ledger = StagingLedger::new();
    stage_write(&mut ledger, "a.md", "fresh", None);
    stage_write(&mut ledger, "b.md", "based on v1", Some(&first.revision));
    stage_write(&mut ledger, "c.md", "never sent", None);

    let summary = editor
        .flush(&mut ledger, "Publish", &author())
        .await
        .expect("flush");

    assert_eq!(summary.committed.len(), 1);
    assert_eq!(summary.committed[0].resource.path, "a.md");
    let stop = summary.stopped_at.expect("stopped");
    assert_eq!(stop.resource.path, "b.md");
    assert_eq!(stop.error.kind, "conflict");
    assert_eq!(stop.error.status, 409);
    assert_eq!(summary.remaining, 2);

    let left: Vec<&str> = ledger
        .list_staged()
        .iter()
        .map(|change| change.resource.path.as_str())
        .collect();
    assert_eq!(left, vec!["b.md", "c.md"]);

    let reader = RevisionReader::new(env.store());
    assert!(reader.read_optional(&env.id("c.md")).await.expect("read").is_none());
}

#[tokio::test]
async fn staged_delete_is_flushed() {
    let env = TestStore::init();
    let created = env.seed("old.md", "bye").await;

    let mut ledger = StagingLedger::new();
    let response = Editor::stage(
        &mut ledger,
        &StageRequest {
            resource: request("old.md"),
            content: None,
            delete: true,
            base_revision: Some(created.revision),
        },
    )
    .expect("stage delete");
    assert_eq!(response.operation, Operation::Delete);

    let report = staging::flush(&mut ledger, &env.writer(), "Remove old", &author()).await;
    assert!(report.is_complete());
    assert_eq!(report.committed[0].revision, None);

    let reader = RevisionReader::new(env.store());
    assert!(reader.read_optional(&env.id("old.md")).await.expect("read").is_none());
}

#[tokio::test]
async fn staged_delete_without_base_is_rejected_locally() {
    let mut ledger = StagingLedger::new();
    let err = Editor::stage(
        &mut ledger,
        &StageRequest {
            resource: request("old.md"),
            content: None,
            delete: true,
            base_revision: None,
        },
    )
    .expect_err("no base");
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn commit_replaces_pending_edit_for_same_path_only() {
    let env = TestStore::init();
    let editor = env.editor();

    let mut ledger = StagingLedger::new();
    stage_write(&mut ledger, "p.md", "staged version", None);
    stage_write(&mut ledger, "q.md", "other draft", None);

    let outcome = editor
        .commit(
            &mut ledger,
            &CommitRequest {
                resource: request("p.md"),
                content: "committed version".to_string(),
                message: "Commit p".to_string(),
                base_revision: None,
            },
            &author(),
        )
        .await
        .expect("commit");

    let reader = RevisionReader::new(env.store());
    let (content, revision) = reader.read_file(&env.id("p.md")).await.expect("read");
    assert_eq!(content, "committed version");
    assert_eq!(revision, outcome.revision);

    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.list_staged()[0].resource.path, "q.md");
    assert!(reader.read_optional(&env.id("q.md")).await.expect("read").is_none());
}

#[tokio::test]
async fn failed_commit_stays_staged() {
    let env = TestStore::init();
    let editor = env.editor();
    let first = env.seed("p.md", "v1").await;
    env.update("p.md", "v2", &first.revision).await;

    let mut ledger = StagingLedger::new();
    let err = editor
        .commit(
            &mut ledger,
            &CommitRequest {
                resource: request("p.md"),
                content: "mine".to_string(),
                message: "Commit p".to_string(),
                base_revision: Some(first.revision.clone()),
            },
            &author(),
        )
        .await
        .expect_err("stale");
    assert!(matches!(err, Error::Conflict { .. }));

    let pending = ledger.get(&env.id("p.md")).expect("still staged");
    assert_eq!(pending.content.as_deref(), Some("mine"));
    assert_eq!(pending.base_revision.as_ref(), Some(&first.revision));
}

#[tokio::test]
async fn persisted_session_survives_between_invocations() {
    let env = TestStore::init();
    let editor = env.editor();
    let file = LedgerFile::new(&env.state_dir(), "editor-1").expect("ledger file");

    {
        let mut locked = file.lock().expect("lock");
        stage_write(locked.ledger_mut(), "later.md", "queued", None);
        locked.save().expect("save");
    }

    let mut locked = file.lock().expect("lock");
    assert_eq!(locked.ledger().len(), 1);
    let summary = editor
        .flush(locked.ledger_mut(), "Flush session", &author())
        .await
        .expect("flush");
    locked.save().expect("save");
    drop(locked);

    assert_eq!(summary.committed.len(), 1);
    assert!(file.load().expect("load").is_empty());
    assert!(!file.path().exists());
}

#[tokio::test]
async fn flush_rejects_empty_message_before_touching_ledger() {
    let env = TestStore::init();
    let mut ledger = StagingLedger::new();
    stage_write(&mut ledger, "a.md", "x", None);

    let err = env
        .editor()
        .flush(&mut ledger, "  ", &author())
        .await
        .expect_err("empty message");
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(ledger.len(), 1);
}
