//! Shared output formatting for folio CLI commands.

use serde::Serialize;

use crate::api::Envelope;
use crate::error::{Error, JsonError, Result};

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

/// Print a successful result: the envelope in JSON mode, `human` otherwise.
pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let payload = Envelope::ok(data);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

/// Print a result that stopped part way: the JSON envelope reports
/// `success: false` and carries both the data and the stopping error.
pub fn emit_partial<T: Serialize>(
    options: OutputOptions,
    data: &T,
    error: &JsonError,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let payload = Envelope::partial(data, error.clone());
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if let Some(human) = human {
        // The stop reason is a warning in the layout, so print it even when quiet.
        println!("{}", format_human(human));
    }

    Ok(())
}

pub fn emit_error(err: &Error, json: bool) -> Result<()> {
    if json {
        let payload: Envelope<()> = Envelope::err(err);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = error_next_steps(err).first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = Vec::new();
    lines.push(output.header.clone());

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

/// Shorten a revision or commit id for display.
pub fn short_id(id: &str) -> &str {
    id.get(..10).unwrap_or(id)
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::Conflict { path, .. } => vec![format!(
            "folio status <repo> {path} to fetch the current revision, then retry"
        )],
        Error::InvalidRepoFormat(_) => vec!["repositories are written as owner/name".to_string()],
        Error::InvalidConfig(_) => vec!["fix .folio.toml then retry".to_string()],
        Error::AuthFailure(_) => vec!["check the token in the configured token_env".to_string()],
        Error::RateLimited(_) => vec!["wait for the rate limit window to reset".to_string()],
        Error::LockFailed(_) => vec!["another folio process holds the session ledger".to_string()],
        _ => Vec::new(),
    }
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}
