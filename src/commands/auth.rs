//! `scmctl auth`: credential exchange check.

use super::{Session, print_json};
use crate::Context;
use crate::cli::{AuthArgs, ConnectionArgs};
use crate::state::TokenCache;
use crate::ui;
use anyhow::Result;
use chrono::{DateTime, Utc};
use scmkit::{ErrorDescriptor, Token};
use serde::Serialize;
use std::process::ExitCode;

/// What `auth` reports. Never includes the token itself.
#[derive(Debug, Serialize)]
struct TokenReport {
    token_type: String,
    expires_at: DateTime<Utc>,
    expires_in: u64,
    scope: Option<String>,
    /// `false` when the token came from the cache.
    exchanged: bool,
}

impl TokenReport {
    fn new(token: &Token, now: DateTime<Utc>, exchanged: bool) -> Self {
        Self {
            token_type: token.token_type.clone(),
            expires_at: token.expires_at,
            expires_in: token.remaining(now).as_secs(),
            scope: token.scope.clone(),
            exchanged,
        }
    }
}

pub fn run(ctx: &Context, connection: &ConnectionArgs, args: AuthArgs) -> Result<ExitCode> {
    if args.forget {
        TokenCache::open()?.clear()?;
        if !ctx.quiet {
            ui::success("Token cache cleared");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut session = Session::open(ctx, connection)?;
    match session.client.ensure_valid_token() {
        Ok(token) => {
            session.persist_token();
            let report = TokenReport::new(&token, Utc::now(), session.client.token_refreshes() > 0);
            print_json(&report)?;
            if !ctx.quiet {
                ui::header("Token");
                ui::kv("expires at", &report.expires_at.to_rfc3339());
                ui::kv("expires in", &format!("{}s", report.expires_in));
                ui::kv(
                    "source",
                    if report.exchanged { "credential exchange" } else { "cache" },
                );
                if let Some(cache) = session.cache() {
                    ui::kv("cache", &cache.file().display().to_string());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let error = ErrorDescriptor::from(&e);
            print_json(&serde_json::json!({ "error": error }))?;
            ui::error(&error.to_string());
            ui::dim(error.advice());
            Ok(ExitCode::FAILURE)
        }
    }
}
