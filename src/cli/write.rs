//! Commands that create commits: commit, flush, revert.

use crate::api::{CommitRequest, RevertRequest};
use crate::error::{exit_codes, Result};
use crate::output::{emit_partial, emit_success, short_id, HumanOutput};
use crate::resource::Revision;

use super::{runtime, ContentArgs, Context};

/// Options for the commit command
pub struct CommitOptions {
    pub repo: String,
    pub path: String,
    pub content: ContentArgs,
    pub base: Option<String>,
    pub message: String,
}

pub fn run_commit(ctx: &Context, options: CommitOptions) -> Result<()> {
    let request = CommitRequest {
        resource: ctx.resource(&options.repo, &options.path),
        content: options.content.require()?,
        message: options.message,
        base_revision: options.base.map(Revision::new),
    };
    let author = ctx.author()?;
    let editor = ctx.editor()?;
    let file = ctx.ledger_file()?;

    let mut locked = file.lock()?;
    let result = runtime()?.block_on(editor.commit(locked.ledger_mut(), &request, &author));
    // The staged entry stays behind on failure, so persist either way.
    locked.save()?;
    drop(locked);
    let outcome = result?;

    let mut human = HumanOutput::new(format!(
        "folio commit: {}:{}@{}",
        options.repo, options.path, ctx.branch
    ));
    human.push_summary("revision", outcome.revision.to_string());
    human.push_summary("commit", short_id(&outcome.commit_sha));
    human.push_summary("author", format!("{} <{}>", author.name, author.email));

    emit_success(ctx.output, &outcome, Some(&human))
}

/// Returns the exit code: non-zero when the flush stopped early, in which case
/// the JSON envelope has `success: false` with the summary under `data`.
pub fn run_flush(ctx: &Context, message: &str) -> Result<i32> {
    let author = ctx.author()?;
    let editor = ctx.editor()?;
    let file = ctx.ledger_file()?;

    let mut locked = file.lock()?;
    let summary = runtime()?.block_on(editor.flush(locked.ledger_mut(), message, &author))?;
    locked.save()?;
    drop(locked);

    let mut human = HumanOutput::new(format!("folio flush: session {}", file.session()));
    human.push_summary("committed", summary.committed.len().to_string());
    human.push_summary("remaining", summary.remaining.to_string());
    for change in &summary.committed {
        human.push_detail(format!(
            "{:<6} {} -> {}",
            change.operation,
            change.resource,
            short_id(&change.commit_sha)
        ));
    }

    match &summary.stopped_at {
        Some(stop) => {
            human.push_warning(format!(
                "stopped at {} {}: {}",
                stop.operation, stop.resource, stop.error.message
            ));
            human.push_next_step("folio staged".to_string());
            emit_partial(ctx.output, &summary, &stop.error, Some(&human))?;
            Ok(exit_codes::for_status(stop.error.status))
        }
        None => {
            emit_success(ctx.output, &summary, Some(&human))?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

pub fn run_revert(ctx: &Context, repo: &str, path: &str, commit: &str, message: &str) -> Result<()> {
    let request = RevertRequest {
        resource: ctx.resource(repo, path),
        target_commit_sha: commit.to_string(),
        message: message.to_string(),
    };
    let author = ctx.author()?;
    let editor = ctx.editor()?;
    let outcome = runtime()?.block_on(editor.revert(&request, &author))?;

    let mut human = HumanOutput::new(format!("folio revert: {repo}:{path}@{}", ctx.branch));
    human.push_summary("restored from", short_id(commit));
    human.push_summary("revision", outcome.revision.to_string());
    human.push_summary("commit", short_id(&outcome.commit_sha));

    emit_success(ctx.output, &outcome, Some(&human))
}
