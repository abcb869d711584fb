//! Commit author resolution.
//!
//! Each field resolves independently:
//! 1) CLI --author-name / --author-email (explicit)
//! 2) FOLIO_AUTHOR_NAME / FOLIO_AUTHOR_EMAIL environment variables
//! 3) Config `[author]` section (defaults to folio <folio@localhost>)
//!
//! The identity is resolved once at the call site and handed to every write.

use crate::config::AuthorConfig;
use crate::error::{Error, Result};
use crate::resource::AuthorIdentity;

pub const AUTHOR_NAME_ENV: &str = "FOLIO_AUTHOR_NAME";
pub const AUTHOR_EMAIL_ENV: &str = "FOLIO_AUTHOR_EMAIL";

/// Resolve the commit identity using CLI, environment, and config.
pub fn resolve_author(
    cli_name: Option<&str>,
    cli_email: Option<&str>,
    config: &AuthorConfig,
) -> Result<AuthorIdentity> {
    resolve_author_with(cli_name, cli_email, config, |key| std::env::var(key).ok())
}

/// Same as [`resolve_author`] with an injectable environment lookup.
pub fn resolve_author_with<F>(
    cli_name: Option<&str>,
    cli_email: Option<&str>,
    config: &AuthorConfig,
    env: F,
) -> Result<AuthorIdentity>
where
    F: Fn(&str) -> Option<String>,
{
    let env_name = env(AUTHOR_NAME_ENV);
    let env_email = env(AUTHOR_EMAIL_ENV);

    let name = non_empty(cli_name)
        .or_else(|| non_empty(env_name.as_deref()))
        .unwrap_or(config.name.as_str());
    let email = non_empty(cli_email)
        .or_else(|| non_empty(env_email.as_deref()))
        .unwrap_or(config.email.as_str());

    validate(name, email)?;
    Ok(AuthorIdentity::new(name.trim(), email.trim()))
}

fn validate(name: &str, email: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("author name cannot be empty".to_string()));
    }
    if !email.contains('@') {
        return Err(Error::InvalidInput(format!(
            "author email '{email}' is not an email address"
        )));
    }
    Ok(())
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn falls_back_to_config() {
        let author = resolve_author_with(None, None, &AuthorConfig::default(), no_env)
            .expect("author");
        assert_eq!(author, AuthorIdentity::new("folio", "folio@localhost"));
    }

    #[test]
    fn cli_beats_env_beats_config() {
        let env = |key: &str| match key {
            AUTHOR_NAME_ENV => Some("Env Name".to_string()),
            AUTHOR_EMAIL_ENV => Some("env@example.com".to_string()),
            _ => None,
        };

        let author =
            resolve_author_with(Some("Cli Name"), None, &AuthorConfig::default(), env)
                .expect("author");
        assert_eq!(author.name, "Cli Name");
        assert_eq!(author.email, "env@example.com");
    }

    #[test]
    fn blank_values_are_skipped() {
        let env = |key: &str| match key {
            AUTHOR_NAME_ENV => Some("   ".to_string()),
            _ => None,
        };
        let author = resolve_author_with(Some(""), None, &AuthorConfig::default(), env)
            .expect("author");
        assert_eq!(author.name, "folio");
    }

    #[test]
    fn invalid_email_rejected() {
        let err = resolve_author_with(None, Some("nobody"), &AuthorConfig::default(), no_env)
            .expect_err("invalid email");
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
