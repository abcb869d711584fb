//! Command-line interface for folio
//!
//! This module defines the CLI structure using clap derive macros.
//! Commands are grouped into submodules by what they touch: `read` for
//! lookups, `stage` for the session ledger, `write` for commits.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::api::{Editor, ResourceRequest};
use crate::author::resolve_author;
use crate::config::{Config, CONFIG_FILENAME};
use crate::error::{exit_codes, Error, Result};
use crate::ledger_file::{LedgerFile, DEFAULT_SESSION};
use crate::output::OutputOptions;
use crate::resource::AuthorIdentity;
use crate::store::open_store;

mod read;
mod stage;
mod write;

/// folio - revision-safe edits to hosted repositories
///
/// Reads and writes text resources in a remote repository, refusing any
/// write based on a stale revision.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (defaults to ./.folio.toml)
    #[arg(long, global = true, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Branch (or commit, for reads) to operate on
    #[arg(long, short = 'b', global = true, env = "FOLIO_BRANCH")]
    pub branch: Option<String>,

    /// Editing session whose staged changes to use
    #[arg(long, global = true, env = "FOLIO_SESSION", default_value = DEFAULT_SESSION)]
    pub session: String,

    /// Commit author name
    #[arg(long, global = true)]
    pub author_name: Option<String>,

    /// Commit author email
    #[arg(long, global = true)]
    pub author_email: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a file or list a directory
    Read {
        /// Repository as owner/name
        repo: String,

        /// Path inside the repository
        #[arg(default_value = "")]
        path: String,

        /// Show the content as of this commit instead
        #[arg(long)]
        at: Option<String>,
    },

    /// Check whether a known revision is still current
    Status {
        repo: String,
        path: String,

        /// Revision the editor last saw
        #[arg(long)]
        known: Option<String>,
    },

    /// Stage an edit without committing it
    Stage {
        repo: String,
        path: String,

        #[command(flatten)]
        content: ContentArgs,

        /// Stage a delete instead of a write
        #[arg(long, conflicts_with_all = ["content", "file"])]
        delete: bool,

        /// Revision the edit is based on (omit for a new file)
        #[arg(long)]
        base: Option<String>,
    },

    /// List staged changes in this session
    Staged,

    /// Drop a staged change
    Discard { repo: String, path: String },

    /// Commit one resource now
    Commit {
        repo: String,
        path: String,

        #[command(flatten)]
        content: ContentArgs,

        /// Revision the edit is based on (omit for a new file)
        #[arg(long)]
        base: Option<String>,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Commit all staged changes in order
    Flush {
        /// Commit message used for every change
        #[arg(short, long)]
        message: String,
    },

    /// Restore a resource to its content at an earlier commit
    Revert {
        repo: String,
        path: String,

        /// Commit whose content to restore
        commit: String,

        #[arg(short, long)]
        message: String,
    },

    /// Commits that touched a resource, newest first
    History {
        repo: String,
        path: String,

        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List a collection with front-matter metadata
    Ls {
        repo: String,

        #[arg(default_value = "")]
        path: String,

        /// Glob on file names (e.g. "2024-*")
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Repositories visible to the configured credentials
    Repos,
}

/// New content, inline or from a file ("-" reads stdin)
#[derive(Args, Debug, Clone, Default)]
pub struct ContentArgs {
    /// Content to write
    #[arg(long, conflicts_with = "file")]
    pub content: Option<String>,

    /// Read content from a file, or stdin with "-"
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

impl ContentArgs {
    pub(crate) fn read(&self) -> Result<Option<String>> {
        if let Some(content) = &self.content {
            return Ok(Some(content.clone()));
        }
        match &self.file {
            Some(path) if path == Path::new("-") => {
                let mut buffer = String::new();
                std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)?;
                Ok(Some(buffer))
            }
            Some(path) => Ok(Some(std::fs::read_to_string(path)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn require(&self) -> Result<String> {
        self.read()?.ok_or_else(|| {
            Error::InvalidInput("provide --content or --file".to_string())
        })
    }
}

/// Shared state derived from global flags.
pub(crate) struct Context {
    pub config: Config,
    pub branch: String,
    pub session: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub output: OutputOptions,
}

impl Context {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load(path)?,
            None => {
                let cwd = std::env::current_dir()?;
                Config::load_from_dir(&cwd)
            }
        };
        let branch = cli
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| config.branch.clone());

        tracing::debug!(
            config = %cli.config.as_deref().unwrap_or(Path::new(CONFIG_FILENAME)).display(),
            branch = %branch,
            session = %cli.session,
            "resolved context"
        );

        Ok(Self {
            config,
            branch,
            session: cli.session.clone(),
            author_name: cli.author_name.clone(),
            author_email: cli.author_email.clone(),
            output: OutputOptions {
                json: cli.json,
                quiet: cli.quiet,
            },
        })
    }

    pub fn editor(&self) -> Result<Editor> {
        let store = open_store(&self.config)?;
        Ok(Editor::new(store, &self.config))
    }

    pub fn ledger_file(&self) -> Result<LedgerFile> {
        let state_dir = self.config.staging.resolve_state_dir()?;
        LedgerFile::new(&state_dir, &self.session)
    }

    pub fn author(&self) -> Result<AuthorIdentity> {
        resolve_author(
            self.author_name.as_deref(),
            self.author_email.as_deref(),
            &self.config.author,
        )
    }

    pub fn resource(&self, repo: &str, path: &str) -> ResourceRequest {
        ResourceRequest::new(repo, self.branch.clone(), path)
    }
}

/// Current-thread runtime for one command.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| Error::OperationFailed(format!("failed to start async runtime: {err}")))
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn run(self) -> Result<i32> {
        let ctx = Context::from_cli(&self)?;
        let done = |result: Result<()>| result.map(|()| exit_codes::SUCCESS);

        match self.command {
            Commands::Read { repo, path, at } => done(read::run_read(&ctx, &repo, &path, at)),
            Commands::Status { repo, path, known } => {
                done(read::run_status(&ctx, &repo, &path, known))
            }
            Commands::History { repo, path, limit } => {
                done(read::run_history(&ctx, &repo, &path, limit))
            }
            Commands::Ls {
                repo,
                path,
                pattern,
            } => done(read::run_ls(&ctx, &repo, &path, pattern)),
            Commands::Repos => done(read::run_repos(&ctx)),
            Commands::Stage {
                repo,
                path,
                content,
                delete,
                base,
            } => done(stage::run_stage(
                &ctx,
                stage::StageOptions {
                    repo,
                    path,
                    content,
                    delete,
                    base,
                },
            )),
            Commands::Staged => done(stage::run_staged(&ctx)),
            Commands::Discard { repo, path } => done(stage::run_discard(&ctx, &repo, &path)),
            Commands::Commit {
                repo,
                path,
                content,
                base,
                message,
            } => done(write::run_commit(
                &ctx,
                write::CommitOptions {
                    repo,
                    path,
                    content,
                    base,
                    message,
                },
            )),
            Commands::Flush { message } => write::run_flush(&ctx, &message),
            Commands::Revert {
                repo,
                path,
                commit,
                message,
            } => done(write::run_revert(&ctx, &repo, &path, &commit, &message)),
        }
    }
}
