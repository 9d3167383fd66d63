//! `config.toml` loading and resolution into client settings.
//!
//! Precedence, highest first: command-line flag, environment variable (both
//! handled by clap), config file, built-in default.

use crate::cli::ConnectionArgs;
use crate::paths;
use anyhow::{Context, Result, bail};
use scmkit::{ClientConfig, Credentials, RetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// File format
// ============================================================================

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScmConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tsg_id: Option<String>,
    pub token_url: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: Option<u64>,
    pub token_margin_secs: Option<u64>,
    pub page_limit: Option<u64>,
    pub max_pages: Option<usize>,
    /// Presence of this table turns on retries for `apply`.
    pub retry: Option<RetrySection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub backoff_factor: f64,
    pub max_delay_secs: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_secs: defaults.base_delay.as_secs_f64(),
            backoff_factor: defaults.backoff_factor,
            max_delay_secs: defaults.max_delay.as_secs_f64(),
        }
    }
}

impl RetrySection {
    /// Validate the table and convert it into a [`RetryConfig`].
    pub fn to_retry_config(&self) -> Result<RetryConfig> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            bail!(
                "Invalid [retry] backoff_factor {}: must be a finite, non-negative number",
                self.backoff_factor
            );
        }
        Ok(RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: seconds("base_delay_secs", self.base_delay_secs)?,
            backoff_factor: self.backoff_factor,
            max_delay: seconds("max_delay_secs", self.max_delay_secs)?,
        })
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    if value < 0.0 {
        bail!("Invalid [retry] {field} {value}: must not be negative");
    }
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("Invalid [retry] {field} {value}: out of range"))
}

impl ScmConfig {
    /// Load the config file.
    ///
    /// An explicit path must exist; the default location may be missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load a specific config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Merge command-line/env overrides and build client settings.
    pub fn resolve(self, overrides: &ConnectionArgs) -> Result<Settings> {
        let client_id = overrides
            .client_id
            .clone()
            .or(self.client_id)
            .context("No client id: pass --client-id, set SCM_CLIENT_ID or add client_id to config.toml")?;
        let client_secret = overrides
            .client_secret
            .clone()
            .or(self.client_secret)
            .context("No client secret: set SCM_CLIENT_SECRET or add client_secret to config.toml")?;
        let tsg_id = overrides
            .tsg_id
            .clone()
            .or(self.tsg_id)
            .context("No tenant service group: pass --tsg-id, set SCM_TSG_ID or add tsg_id to config.toml")?;

        let mut client = ClientConfig::new();
        if let Some(url) = overrides.token_url.clone().or(self.token_url) {
            client = client.token_url(url);
        }
        if let Some(url) = overrides.api_base.clone().or(self.api_base) {
            client = client.api_base(url);
        }
        if let Some(secs) = self.timeout_secs {
            client = client.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.token_margin_secs {
            client = client.token_margin(Duration::from_secs(secs));
        }
        if let Some(limit) = self.page_limit {
            client = client.page_limit(limit);
        }
        if let Some(pages) = self.max_pages {
            client = client.max_pages(pages);
        }

        Ok(Settings {
            credentials: Credentials::new(client_id, client_secret, tsg_id),
            client,
            retry: self
                .retry
                .as_ref()
                .map(RetrySection::to_retry_config)
                .transpose()?,
        })
    }
}

/// Everything needed to build a client for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub client: ClientConfig,
    /// `None` unless the config file has a `[retry]` table.
    pub retry: Option<RetryConfig>,
}

impl Settings {
    /// Retry policy for `apply`, with `--retries` taking precedence.
    pub fn retry_policy(&self, retries: Option<u32>) -> Option<RetryConfig> {
        match retries {
            Some(n) => {
                let mut policy = self.retry.clone().unwrap_or_default();
                policy.max_attempts = n.saturating_add(1);
                Some(policy)
            }
            None => self.retry.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use scmkit::types::{DEFAULT_API_BASE, DEFAULT_TOKEN_URL};
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
client_id = "svc@1234567890.iam.panserviceaccount.com"
client_secret = "s3cret"
tsg_id = "1234567890"
api_base = "https://api.example.test/"
timeout_secs = 10
token_margin_secs = 120
page_limit = 50

[retry]
max_attempts = 5
"#,
        );

        let config = ScmConfig::load(Some(&path)).unwrap();
        assert_eq!(config.tsg_id.as_deref(), Some("1234567890"));
        assert_eq!(config.retry.as_ref().unwrap().max_attempts, 5);
        assert!((config.retry.as_ref().unwrap().backoff_factor - 2.0).abs() < f64::EPSILON);

        let settings = config.resolve(&ConnectionArgs::default()).unwrap();
        assert_eq!(settings.credentials.tenant_scope_id(), "1234567890");
        assert_eq!(settings.client.api_base, "https://api.example.test");
        assert_eq!(settings.client.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(settings.client.timeout, Duration::from_secs(10));
        assert_eq!(settings.client.token_margin, Duration::from_secs(120));
        assert_eq!(settings.client.page_limit, 50);
        assert_eq!(settings.retry.unwrap().max_attempts, 5);
    }

    #[test]
    fn test_overrides_beat_file() {
        let config = ScmConfig {
            client_id: Some("file-id".to_string()),
            client_secret: Some("file-secret".to_string()),
            tsg_id: Some("111".to_string()),
            ..ScmConfig::default()
        };
        let overrides = ConnectionArgs {
            client_id: Some("flag-id".to_string()),
            tsg_id: Some("222".to_string()),
            api_base: Some("https://override.test".to_string()),
            ..ConnectionArgs::default()
        };

        let settings = config.resolve(&overrides).unwrap();
        assert_eq!(settings.credentials.client_id(), "flag-id");
        assert_eq!(settings.credentials.client_secret(), "file-secret");
        assert_eq!(settings.credentials.tenant_scope_id(), "222");
        assert_eq!(settings.client.api_base, "https://override.test");
        assert!(settings.retry.is_none());
    }

    #[test]
    fn test_defaults_when_unset() {
        let overrides = ConnectionArgs {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            tsg_id: Some("1".to_string()),
            ..ConnectionArgs::default()
        };
        let settings = ScmConfig::default().resolve(&overrides).unwrap();
        assert_eq!(settings.client, ClientConfig::default());
        assert_eq!(settings.client.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_missing_credentials_named_in_error() {
        let err = ScmConfig::default()
            .resolve(&ConnectionArgs::default())
            .unwrap_err();
        assert!(err.to_string().contains("SCM_CLIENT_ID"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "client_idd = \"typo\"\n");
        assert!(ScmConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(ScmConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_retry_policy() {
        let settings = ScmConfig::default()
            .resolve(&ConnectionArgs {
                client_id: Some("id".to_string()),
                client_secret: Some("secret".to_string()),
                tsg_id: Some("1".to_string()),
                ..ConnectionArgs::default()
            })
            .unwrap();

        assert!(settings.retry_policy(None).is_none());
        assert_eq!(settings.retry_policy(Some(2)).unwrap().max_attempts, 3);
        assert_eq!(settings.retry_policy(Some(0)).unwrap().max_attempts, 1);
    }

    #[test]
    fn test_invalid_retry_values_rejected() {
        let dir = TempDir::new().unwrap();
        let overrides = ConnectionArgs {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            tsg_id: Some("1".to_string()),
            ..ConnectionArgs::default()
        };

        for (table, field) in [
            ("backoff_factor = -2.0", "backoff_factor"),
            ("backoff_factor = nan", "backoff_factor"),
            ("max_delay_secs = inf", "max_delay_secs"),
            ("base_delay_secs = -1.0", "base_delay_secs"),
            ("max_delay_secs = 1e300", "max_delay_secs"),
        ] {
            let path = write_config(&dir, &format!("[retry]\n{table}\n"));
            let config = ScmConfig::load_from(&path).unwrap();
            let err = config.resolve(&overrides).unwrap_err();
            assert!(err.to_string().contains(field), "{table}: {err:#}");
        }
    }
}
