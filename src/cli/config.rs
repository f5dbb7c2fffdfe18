use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::{fs, path::Path};

/// Defaults read from `config.yml`, every key is optional and command line
/// flags take precedence
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub api_url: Option<String>,
    pub bucket_code: Option<String>,
    pub token: Option<SecretString>,
    pub token_file: Option<String>,
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
}

impl Config {
    /// # Errors
    ///
    /// Will return `Err` if the file can not be opened or parsed
    pub fn new(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("unable to open {}", config_path.display()))?;

        // an empty file is a valid config
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml_ng::from_str(&content).context("unable to parse config file")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONF: &str = r"---
api_url: https://zerofs.link/api/
bucket_code: eu
token_file: /etc/zeroup/auth.json
concurrency: 8
retries: 3";

    #[test]
    fn test_config() {
        let mut tmp_file = NamedTempFile::new().unwrap();
        tmp_file.write_all(CONF.as_bytes()).unwrap();

        let config = Config::new(tmp_file.path()).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("https://zerofs.link/api/"));
        assert_eq!(config.bucket_code.as_deref(), Some("eu"));
        assert!(config.token.is_none());
        assert_eq!(config.token_file.as_deref(), Some("/etc/zeroup/auth.json"));
        assert_eq!(config.concurrency, Some(8));
        assert_eq!(config.retries, Some(3));
    }

    #[test]
    fn test_config_token() {
        let mut tmp_file = NamedTempFile::new().unwrap();
        tmp_file.write_all(b"token: secret").unwrap();

        let config = Config::new(tmp_file.path()).unwrap();
        assert_eq!(config.token.as_ref().map(|t| t.expose_secret()), Some("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_config_empty() {
        let tmp_file = NamedTempFile::new().unwrap();
        let config = Config::new(tmp_file.path()).unwrap();
        assert!(config.api_url.is_none());
        assert!(config.concurrency.is_none());
    }

    #[test]
    fn test_config_invalid() {
        let mut tmp_file = NamedTempFile::new().unwrap();
        tmp_file.write_all(b"concurrency: many").unwrap();
        assert!(Config::new(tmp_file.path()).is_err());
    }

    #[test]
    fn test_config_missing() {
        assert!(Config::new(Path::new("/nonexistent/config.yml")).is_err());
    }
}
