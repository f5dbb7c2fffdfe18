use anyhow::{Context, Result};
use colored::Colorize;
use secrecy::SecretString;
use serde::Deserialize;
use std::{fs, path::Path};

pub const DEFAULT_TOKEN_FILE: &str = "auth.json";

#[derive(Deserialize)]
struct TokenFile {
    token: Option<String>,
}

/// Read the `{"token": "..."}` file, a missing file is not an error
///
/// # Errors
///
/// Will return `Err` if the file exists but can not be read or parsed
pub fn read_token_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("unable to read {}", path.display()))?;

    let file: TokenFile = serde_json::from_str(&content)
        .with_context(|| format!("unable to parse {}", path.display()))?;

    Ok(file.token)
}

/// Pick the token from the flag, then the config file, then the token file.
/// A broken token file only produces a warning, the upload goes on anonymously.
#[must_use]
pub fn resolve_token(
    flag: Option<&str>,
    config: Option<&str>,
    token_file: &Path,
) -> Option<SecretString> {
    let token = flag.or(config).map(ToString::to_string).or_else(|| {
        read_token_file(token_file).unwrap_or_else(|e| {
            eprintln!("{} {e:#}", "Warning:".yellow());
            None
        })
    });

    token
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from)
}
