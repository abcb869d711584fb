//! Read-only commands: read, status, history, ls, repos.

use crate::api::{CollectionRequest, HistoryRequest, StalenessRequest};
use crate::error::Result;
use crate::output::{emit_success, short_id, HumanOutput};
use crate::reader::Resource;
use crate::resource::Revision;

use super::{runtime, Context};

pub fn run_read(ctx: &Context, repo: &str, path: &str, at: Option<String>) -> Result<()> {
    let editor = ctx.editor()?;
    let request = ctx.resource(repo, path);
    let rt = runtime()?;

    if let Some(commit) = at {
        let content = rt.block_on(editor.materialize_at(&request, &commit))?;
        if ctx.output.json {
            #[derive(serde::Serialize)]
            struct Materialized<'a> {
                commit: &'a str,
                content: &'a str,
            }
            let data = Materialized {
                commit: &commit,
                content: &content,
            };
            return emit_success(ctx.output, &data, None);
        }
        if !ctx.output.quiet {
            print!("{content}");
        }
        return Ok(());
    }

    let resource = rt.block_on(editor.read(&request))?;
    if ctx.output.json {
        return emit_success(ctx.output, &resource, None);
    }
    if ctx.output.quiet {
        return Ok(());
    }
    match resource {
        Resource::File { content, .. } => print!("{content}"),
        Resource::Directory { entries } => {
            let mut human = HumanOutput::new(format!("folio read: {repo}:{path}@{}", ctx.branch));
            human.push_summary("entries", entries.len().to_string());
            for entry in entries {
                human.push_detail(format!(
                    "{:<9} {}  {}",
                    format!("{:?}", entry.kind).to_lowercase(),
                    short_id(entry.revision.as_str()),
                    entry.name
                ));
            }
            emit_success(ctx.output, &(), Some(&human))?;
        }
    }
    Ok(())
}

pub fn run_status(ctx: &Context, repo: &str, path: &str, known: Option<String>) -> Result<()> {
    let editor = ctx.editor()?;
    let request = StalenessRequest {
        resource: ctx.resource(repo, path),
        known_revision: known.map(Revision::new),
    };
    let staleness = runtime()?.block_on(editor.check_staleness(&request))?;

    let mut human = HumanOutput::new(format!("folio status: {repo}:{path}@{}", ctx.branch));
    human.push_summary("exists", staleness.exists.to_string());
    human.push_summary(
        "current revision",
        staleness
            .current_revision
            .as_ref()
            .map(|rev| rev.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    human.push_summary("changed", staleness.changed.to_string());
    if staleness.changed {
        human.push_next_step(format!("folio read {repo} {path}"));
    }

    emit_success(ctx.output, &staleness, Some(&human))
}

pub fn run_history(ctx: &Context, repo: &str, path: &str, limit: Option<usize>) -> Result<()> {
    let editor = ctx.editor()?;
    let request = HistoryRequest {
        resource: ctx.resource(repo, path),
        limit,
    };
    let entries = runtime()?.block_on(editor.history(&request))?;

    let mut human = HumanOutput::new(format!("folio history: {repo}:{path}@{}", ctx.branch));
    human.push_summary("commits", entries.len().to_string());
    for entry in &entries {
        human.push_detail(format!(
            "{} {} {} <{}> {}",
            short_id(&entry.sha),
            entry.author.date.format("%Y-%m-%d %H:%M"),
            entry.author.name,
            entry.author.email,
            entry.message
        ));
    }

    emit_success(ctx.output, &entries, Some(&human))
}

pub fn run_ls(ctx: &Context, repo: &str, path: &str, pattern: Option<String>) -> Result<()> {
    let editor = ctx.editor()?;
    let request = CollectionRequest {
        resource: ctx.resource(repo, path),
        pattern,
    };
    let items = runtime()?.block_on(editor.list_collection(&request))?;

    let mut human = HumanOutput::new(format!("folio ls: {repo}:{path}@{}", ctx.branch));
    human.push_summary("items", items.len().to_string());
    for item in &items {
        human.push_detail(format!("{}  {}", item.name, item.title));
    }

    emit_success(ctx.output, &items, Some(&human))
}

pub fn run_repos(ctx: &Context) -> Result<()> {
    let editor = ctx.editor()?;
    let repos = runtime()?.block_on(editor.list_repositories())?;

    let mut human = HumanOutput::new("folio repos");
    human.push_summary("repositories", repos.len().to_string());
    for repo in &repos {
        human.push_detail(format!(
            "{} ({}, default branch {})",
            repo.full_name, repo.visibility, repo.default_branch
        ));
    }

    emit_success(ctx.output, &repos, Some(&human))
}
