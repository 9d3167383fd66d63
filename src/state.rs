//! Opt-in bearer token cache (`--cache-token`).
//!
//! The token is stored as JSON in the state directory, keyed by tenant so a
//! token is never offered to a different tenant service group. The file is
//! created with owner-only permissions on Unix.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use scmkit::Token;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// A cached token and what it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    /// Tenant service group the token was scoped to.
    pub tsg_id: String,
    /// Client id that obtained it.
    pub client_id: String,
    pub token: Token,
    pub saved_at: DateTime<Utc>,
}

/// Token cache rooted at a state directory.
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    /// Cache in the default state directory.
    pub fn open() -> Result<Self> {
        Ok(Self::at(crate::paths::state_dir()?))
    }

    /// Cache in a specific directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the cache file.
    pub fn file(&self) -> PathBuf {
        self.dir.join("token.json")
    }

    /// Load a token cached for this client and tenant, if any.
    ///
    /// Unreadable or foreign entries are ignored, expired ones too.
    pub fn load(&self, client_id: &str, tsg_id: &str, now: DateTime<Utc>) -> Result<Option<Token>> {
        let path = self.file();
        if !path.exists() {
            log::debug!("No cached token at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read token cache: {}", path.display()))?;
        let cached: CachedToken = match serde_json::from_str(&content) {
            Ok(cached) => cached,
            Err(e) => {
                log::warn!("Ignoring unreadable token cache {}: {e}", path.display());
                return Ok(None);
            }
        };

        if cached.tsg_id != tsg_id || cached.client_id != client_id {
            log::debug!("Cached token belongs to another client or tenant, ignoring");
            return Ok(None);
        }
        if cached.token.is_expired_at(now) {
            log::debug!("Cached token expired at {}", cached.token.expires_at);
            return Ok(None);
        }

        log::debug!("Loaded cached token expiring at {}", cached.token.expires_at);
        Ok(Some(cached.token))
    }

    /// Persist a token.
    pub fn save(&self, client_id: &str, tsg_id: &str, token: &Token) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory: {}", self.dir.display()))?;

        let cached = CachedToken {
            tsg_id: tsg_id.to_string(),
            client_id: client_id.to_string(),
            token: token.clone(),
            saved_at: Utc::now(),
        };
        let content =
            serde_json::to_string_pretty(&cached).context("Failed to serialize token cache")?;

        let path = self.file();
        write_private(&path, &content)
            .with_context(|| format!("Failed to write token cache: {}", path.display()))?;
        log::debug!("Saved token cache to {}", path.display());
        Ok(())
    }

    /// Remove the cache file if present.
    pub fn clear(&self) -> Result<()> {
        let path = self.file();
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove token cache: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(content.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)
}

// ============================================================================
// Tests
// ============================================================================
