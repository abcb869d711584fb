//! Session ledger commands: stage, staged, discard.
//!
//! None of these contact the remote store.

use crate::api::{Editor, StageRequest};
use crate::error::Result;
use crate::output::{emit_success, short_id, HumanOutput};
use crate::resource::Revision;
use crate::staging::StagedChange;

use super::{Context, ContentArgs};

/// Options for the stage command
pub struct StageOptions {
    pub repo: String,
    pub path: String,
    pub content: ContentArgs,
    pub delete: bool,
    pub base: Option<String>,
}

pub fn run_stage(ctx: &Context, options: StageOptions) -> Result<()> {
    let request = StageRequest {
        resource: ctx.resource(&options.repo, &options.path),
        content: options.content.read()?,
        delete: options.delete,
        base_revision: options.base.map(Revision::new),
    };

    let file = ctx.ledger_file()?;
    let mut locked = file.lock()?;
    let response = Editor::stage(locked.ledger_mut(), &request)?;
    locked.save()?;
    let staged = locked.ledger().len();
    drop(locked);

    let mut human = HumanOutput::new(format!(
        "folio stage: {} {}",
        response.operation, response.change.resource
    ));
    human.push_summary("session", file.session());
    human.push_summary("staged changes", staged.to_string());
    human.push_next_step(format!("folio flush -m \"...\" --session {}", file.session()));

    emit_success(ctx.output, &response, Some(&human))
}

pub fn run_staged(ctx: &Context) -> Result<()> {
    let file = ctx.ledger_file()?;
    let ledger = file.load()?;
    let changes: Vec<StagedChange> = Editor::list_staged(&ledger);

    let mut human = HumanOutput::new(format!("folio staged: session {}", file.session()));
    human.push_summary("staged changes", changes.len().to_string());
    for change in &changes {
        human.push_detail(format!(
            "{:<6} {} (base {}, staged {})",
            change.operation,
            change.resource,
            change
                .base_revision
                .as_ref()
                .map(|rev| short_id(rev.as_str()).to_string())
                .unwrap_or_else(|| "-".to_string()),
            change.staged_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    emit_success(ctx.output, &changes, Some(&human))
}

pub fn run_discard(ctx: &Context, repo: &str, path: &str) -> Result<()> {
    let request = ctx.resource(repo, path);
    let file = ctx.ledger_file()?;
    let mut locked = file.lock()?;
    let response = Editor::discard(locked.ledger_mut(), &request)?;
    if response.discarded {
        locked.save()?;
    }
    drop(locked);

    let mut human = HumanOutput::new(format!("folio discard: {repo}:{path}@{}", ctx.branch));
    human.push_summary("discarded", response.discarded.to_string());
    if !response.discarded {
        human.push_warning("nothing was staged for this resource");
    }

    emit_success(ctx.output, &response, Some(&human))
}
