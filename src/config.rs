//! Configuration loader and validator for the Pipedrive client.
//!
//! Settings come from three places, in order of precedence: explicit builder
//! calls (CLI flags), an optional YAML file, and the environment (`PDTOKEN`).
//! [`ConfigBuilder::build`] validates the collected values and produces an
//! immutable [`Config`]; derived state (HTTP transport and custom-field tables) is
//! initialised afterwards by [`crate::api::Api::new`].
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::pool::ErrorPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.pipedrive.com/v1/";
pub const DEFAULT_TOKEN_ENV: &str = "PDTOKEN";
pub const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Pipedrive token must not be empty (set --token or ${var})")]
    MissingToken { var: String },
    #[error("Invalid base URL '{url}': {reason}")]
    BaseUrl { url: String, reason: String },
}

/// Root of the optional YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub api: ApiSection,
    pub fetch: FetchSection,
    pub custom_fields: CustomFieldsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiSection {
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchSection {
    pub workers: Option<usize>,
    pub fail_fast: Option<bool>,
}

/// Which built-in custom-field tables to apply to decoded records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CustomFieldsSection {
    pub deals: bool,
    pub organizations: bool,
}

/// How request URLs are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UrlLogging {
    #[default]
    Off,
    /// Log URLs with the `api_token` value replaced by an ellipsis.
    Redacted,
    Plain,
}

/// API token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Fixed(String),
    /// Read from the named environment variable at build time.
    Env(String),
}

/// Validated, immutable client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    token: Token,
    base_url: Url,
    timeout: Option<Duration>,
    url_logging: UrlLogging,
    workers: usize,
    error_policy: ErrorPolicy,
    custom_deal_fields: bool,
    custom_org_fields: bool,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn url_logging(&self) -> UrlLogging {
        self.url_logging
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn custom_deal_fields(&self) -> bool {
        self.custom_deal_fields
    }

    pub fn custom_org_fields(&self) -> bool {
        self.custom_org_fields
    }
}

/// Collects settings; nothing is validated until [`ConfigBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    token: Option<TokenSource>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    url_logging: UrlLogging,
    workers: Option<usize>,
    fail_fast: Option<bool>,
    custom_deal_fields: bool,
    custom_org_fields: bool,
}

impl ConfigBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(TokenSource::Fixed(token.into()));
        self
    }

    /// Read the token from `var` (defaults to `PDTOKEN` when empty).
    pub fn env_token(mut self, var: &str) -> Self {
        let var = if var.is_empty() { DEFAULT_TOKEN_ENV } else { var };
        self.token = Some(TokenSource::Env(var.to_string()));
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url_logging(mut self, logging: UrlLogging) -> Self {
        self.url_logging = logging;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    pub fn custom_deal_fields(mut self, enabled: bool) -> Self {
        self.custom_deal_fields = enabled;
        self
    }

    pub fn custom_org_fields(mut self, enabled: bool) -> Self {
        self.custom_org_fields = enabled;
        self
    }

    /// Fill every setting not given explicitly from a loaded file.
    pub fn merge_file(mut self, file: &FileConfig) -> Self {
        if self.token.is_none() {
            if let Some(token) = &file.api.token {
                self.token = Some(TokenSource::Fixed(token.clone()));
            }
        }
        if self.base_url.is_none() {
            self.base_url = file.api.base_url.clone();
        }
        if self.timeout.is_none() {
            self.timeout = file.api.timeout_secs.map(Duration::from_secs);
        }
        if self.workers.is_none() {
            self.workers = file.fetch.workers;
        }
        if self.fail_fast.is_none() {
            self.fail_fast = file.fetch.fail_fast;
        }
        self.custom_deal_fields |= file.custom_fields.deals;
        self.custom_org_fields |= file.custom_fields.organizations;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let source = self
            .token
            .unwrap_or_else(|| TokenSource::Env(DEFAULT_TOKEN_ENV.to_string()));
        let token = match source {
            TokenSource::Fixed(token) => {
                if token.trim().is_empty() {
                    return Err(ConfigError::Invalid("token must be non-empty"));
                }
                token
            }
            TokenSource::Env(var) => match std::env::var(&var) {
                Ok(token) if !token.trim().is_empty() => token,
                _ => return Err(ConfigError::MissingToken { var }),
            },
        };

        let raw_base = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&raw_base)?;

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid("timeout must be > 0"));
        }
        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0"));
        }
        let error_policy = if self.fail_fast.unwrap_or(false) {
            ErrorPolicy::FailFast
        } else {
            ErrorPolicy::CollectAll
        };

        Ok(Config {
            token: Token(token),
            base_url,
            timeout: self.timeout,
            url_logging: self.url_logging,
            workers,
            error_policy,
            custom_deal_fields: self.custom_deal_fields,
            custom_org_fields: self.custom_org_fields,
        })
    }
}

/// Endpoint templates join onto the base, so it must end with a slash.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    let url = Url::parse(&normalized).map_err(|err| ConfigError::BaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::BaseUrl {
            url: raw.to_string(),
            reason: "not a base URL".into(),
        });
    }
    Ok(url)
}

/// Load a YAML config file and validate it.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let cfg: FileConfig = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &FileConfig) -> Result<(), ConfigError> {
    if let Some(token) = &cfg.api.token {
        if token.trim().is_empty() {
            return Err(ConfigError::Invalid("api.token must be non-empty when set"));
        }
    }
    if let Some(url) = &cfg.api.base_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must be non-empty when set"));
        }
    }
    if cfg.api.timeout_secs == Some(0) {
        return Err(ConfigError::Invalid("api.timeout_secs must be > 0"));
    }
    if cfg.fetch.workers == Some(0) {
        return Err(ConfigError::Invalid("fetch.workers must be > 0"));
    }
    Ok(())
}

/// Example config file content.
pub fn example() -> &'static str {
    r#"api:
  token: "YOUR_PIPEDRIVE_API_TOKEN"
  base_url: "https://api.pipedrive.com/v1/"
  timeout_secs: 30

fetch:
  workers: 8
  fail_fast: false

custom_fields:
  deals: true
  organizations: true
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: FileConfig = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.fetch.workers, Some(8));
        assert!(cfg.custom_fields.deals);
    }

    #[test]
    fn empty_file_sections_default() {
        let cfg: FileConfig = serde_yaml::from_str("api: {}\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn invalid_file_values() {
        let mut cfg: FileConfig = serde_yaml::from_str(example()).unwrap();
        cfg.api.token = Some(" ".into());
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("api.token")),
            _ => panic!("wrong error"),
        }

        let mut cfg: FileConfig = serde_yaml::from_str(example()).unwrap();
        cfg.fetch.workers = Some(0);
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("fetch.workers")),
            _ => panic!("wrong error"),
        }

        let mut cfg: FileConfig = serde_yaml::from_str(example()).unwrap();
        cfg.api.timeout_secs = Some(0);
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(&p).unwrap();
        assert_eq!(cfg.api.timeout_secs, Some(30));
    }

    #[test]
    fn explicit_token_wins_over_file() {
        let file: FileConfig = serde_yaml::from_str(example()).unwrap();
        let cfg = Config::builder()
            .token("cli-token")
            .merge_file(&file)
            .build()
            .unwrap();
        assert_eq!(cfg.token().expose(), "cli-token");
        assert_eq!(cfg.workers(), 8);
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(30)));
        assert!(cfg.custom_deal_fields());
    }

    #[test]
    fn empty_fixed_token_rejected() {
        let err = Config::builder().token("").build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("token")));
    }

    #[test]
    fn env_token_resolved_at_build() {
        std::env::set_var("PDTOOLS_TEST_TOKEN_SET", "from-env");
        let cfg = Config::builder()
            .env_token("PDTOOLS_TEST_TOKEN_SET")
            .build()
            .unwrap();
        assert_eq!(cfg.token().expose(), "from-env");

        let err = Config::builder()
            .env_token("PDTOOLS_TEST_TOKEN_UNSET")
            .build()
            .unwrap_err();
        match err {
            ConfigError::MissingToken { var } => assert_eq!(var, "PDTOOLS_TEST_TOKEN_UNSET"),
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let cfg = Config::builder()
            .token("t")
            .base_url("http://127.0.0.1:9999/v1")
            .build()
            .unwrap();
        assert_eq!(cfg.base_url().as_str(), "http://127.0.0.1:9999/v1/");

        let err = Config::builder().token("t").base_url("not a url").build();
        assert!(matches!(err, Err(ConfigError::BaseUrl { .. })));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = Config::builder().token("t").workers(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("workers")));
    }

    #[test]
    fn fail_fast_selects_policy() {
        let cfg = Config::builder().token("t").build().unwrap();
        assert_eq!(cfg.error_policy(), ErrorPolicy::CollectAll);
        let cfg = Config::builder().token("t").fail_fast(true).build().unwrap();
        assert_eq!(cfg.error_policy(), ErrorPolicy::FailFast);
    }

    #[test]
    fn token_debug_is_redacted() {
        let cfg = Config::builder().token("secret-value").build().unwrap();
        assert!(!format!("{:?}", cfg).contains("secret-value"));
    }
}
