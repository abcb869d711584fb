//! folio - revision-safe resource mutation for hosted repositories
//!
//! This library provides the core of the folio CLI: reading text resources
//! from a remote, version-controlled repository and writing them back without
//! ever overwriting a concurrent editor's change.
//!
//! # Core Concepts
//!
//! - **Revisions**: content-hash tokens minted by the store; every write names
//!   the revision it is based on and the store rejects stale ones
//! - **Staging**: edits recorded per session without contacting the store,
//!   committed later in order by a flush
//! - **History**: commits touching a resource and its content at each one
//! - **Revert**: restoring old content as a new, conflict-checked commit
//! - **Collections**: directory listings annotated with front-matter
//!
//! # Module Organization
//!
//! - `locator`: `owner/name` repository identifiers
//! - `resource`: resource ids, revisions, commits, author identities
//! - `store`: the remote store trait and its hosted-API and git backends
//! - `reader`: file/directory reads and staleness checks
//! - `staging`: the per-session staging ledger and flush
//! - `ledger_file`: locked, atomic persistence of session ledgers
//! - `writer`: conflict-safe writes and deletes
//! - `history`: commit listings and point-in-time content
//! - `revert`: restore a resource to an earlier commit
//! - `frontmatter`: front-matter decoding
//! - `collection`: annotated directory listings
//! - `author`: commit identity resolution
//! - `api`: caller-facing operations and the response envelope
//! - `config`: configuration loading from `.folio.toml`
//! - `error`: error types and result aliases
//! - `output`: CLI output formatting
//! - `cli`: command-line interface using clap

pub mod api;
pub mod author;
pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod history;
pub mod ledger_file;
pub mod locator;
pub mod output;
pub mod reader;
pub mod resource;
pub mod revert;
pub mod staging;
pub mod store;
pub mod writer;

pub use error::{Error, Result};
