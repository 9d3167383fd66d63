//! Subcommand implementations and the client setup they share.

pub mod apply;
pub mod auth;
pub mod show;
pub mod types;

use crate::Context;
use crate::cli::ConnectionArgs;
use crate::config::{ScmConfig, Settings};
use crate::state::TokenCache;
use anyhow::{Context as _, Result};
use chrono::Utc;
use scmkit::{Client, ContainerSelection, ResourceKey, ResourceType, container};
use serde::Serialize;

/// Resolve a resource type name against the catalogue.
pub fn resource_type(name: &str) -> Result<ResourceType> {
    ResourceType::lookup(name)
        .with_context(|| format!("Unknown resource type '{name}' (see `scmctl types`)"))
}

/// Human label such as `address 'web' in folder 'Shared'`.
pub fn target_label(
    resource: &ResourceType,
    selection: &ContainerSelection,
    key: &ResourceKey,
) -> String {
    match container::validate(selection) {
        Ok(container) => format!("{resource} {key} in {container}"),
        Err(_) => format!("{resource} {key}"),
    }
}

/// Pretty-print a value as JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Load config and merge overrides.
pub fn settings(connection: &ConnectionArgs) -> Result<Settings> {
    ScmConfig::load(connection.config.as_deref())?.resolve(connection)
}

/// A client for one run, seeded from the token cache when enabled.
pub struct Session {
    pub client: Client,
    pub settings: Settings,
    cache: Option<TokenCache>,
}

impl Session {
    pub fn open(ctx: &Context, connection: &ConnectionArgs) -> Result<Self> {
        let settings = settings(connection)?;
        let mut client = Client::new(settings.credentials.clone(), settings.client.clone());

        let cache = if ctx.cache_token {
            let cache = TokenCache::open()?;
            if let Some(token) = cache.load(
                settings.credentials.client_id(),
                settings.credentials.tenant_scope_id(),
                Utc::now(),
            )? {
                client.seed_token(token);
            }
            Some(cache)
        } else {
            None
        };

        Ok(Self {
            client,
            settings,
            cache,
        })
    }

    /// The token cache, when `--cache-token` is on.
    pub fn cache(&self) -> Option<&TokenCache> {
        self.cache.as_ref()
    }

    /// Write the current token back to the cache, if enabled.
    ///
    /// Cache failures never fail the command.
    pub fn persist_token(&self) {
        let (Some(cache), Some(token)) = (&self.cache, self.client.token()) else {
            return;
        };
        let credentials = &self.settings.credentials;
        if let Err(e) = cache.save(
            credentials.client_id(),
            credentials.tenant_scope_id(),
            token,
        ) {
            log::warn!("Could not cache token: {e:#}");
        }
    }
}
