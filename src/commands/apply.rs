//! `scmctl apply`: one reconciliation.

use super::{Session, print_json, resource_type, target_label};
use crate::Context;
use crate::cli::{ApplyArgs, ConnectionArgs};
use crate::{paths, ui};
use anyhow::{Context as _, Result};
use colored::Colorize;
use dialoguer::Confirm;
use scmkit::retry::{self, LogCallback};
use scmkit::{Action, DesiredState, ExistingResource, ReconciliationOutcome};
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

/// Reconcile one resource and print the outcome.
///
/// `--diff` and the interactive delete prompt read the resource before
/// reconciling, so they cost one extra lookup. The prompt answers against
/// that read; `reconcile` locates the resource again before it mutates, so
/// a delete that races with another writer still acts on current state.
pub fn run(ctx: &Context, connection: &ConnectionArgs, args: ApplyArgs) -> Result<ExitCode> {
    let resource = resource_type(&args.target.resource_type)?;
    let desired = resource
        .desired_from_json(&read_desired(&args)?)
        .context("Invalid desired spec")?;
    let container = args.target.container.selection();
    let key = args.target.key.key();
    let state = DesiredState::from(args.state);
    let subject = target_label(&resource, &container, &key);

    let mut session = Session::open(ctx, connection)?;

    let plan = PreRead::plan(&args, state, io::stdin().is_terminal());
    let before = if plan.lookup {
        match session.client.locate(&resource, &container, &key) {
            Ok(found) => found,
            Err(e) => {
                session.persist_token();
                let outcome = ReconciliationOutcome::failure(&e, args.dry_run);
                return report(ctx, &outcome, &subject);
            }
        }
    } else {
        None
    };

    if plan.confirm && before.is_some() && !confirm_delete(&subject)? {
        ui::warn("Aborted, nothing deleted");
        return Ok(ExitCode::SUCCESS);
    }

    let policy = session.settings.retry_policy(args.retries);
    let client = &mut session.client;
    let mut attempt =
        || client.reconcile(&resource, &container, &key, &desired, state, args.dry_run);
    let outcome = match policy {
        Some(policy) => retry::reconcile_with_retry(&policy, Some(&LogCallback), attempt),
        None => attempt(),
    };
    session.persist_token();

    if args.diff && outcome.is_success() && !ctx.quiet {
        print_diff(before, &outcome);
    }

    report(ctx, &outcome, &subject)
}

/// What `apply` reads before reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PreRead {
    /// Ask before deleting.
    confirm: bool,
    /// Look the resource up ahead of `reconcile`.
    lookup: bool,
}

impl PreRead {
    fn plan(args: &ApplyArgs, state: DesiredState, interactive: bool) -> Self {
        let confirm = state == DesiredState::Absent && !args.dry_run && !args.yes && interactive;
        Self {
            confirm,
            lookup: args.diff || confirm,
        }
    }
}

/// Print the outcome JSON and summary; failure outcomes exit non-zero.
fn report(ctx: &Context, outcome: &ReconciliationOutcome, subject: &str) -> Result<ExitCode> {
    print_json(outcome)?;
    if !ctx.quiet || !outcome.is_success() {
        ui::summary(outcome, subject);
    }
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_desired(args: &ApplyArgs) -> Result<Value> {
    let text = match (&args.spec, &args.spec_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) if path == "-" => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read desired spec from stdin")?;
            text
        }
        (None, Some(path)) => {
            let path = paths::expand(path);
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read spec file: {}", path.display()))?
        }
        (None, None) => return Ok(Value::Object(Map::new())),
    };
    parse_desired(&text)
}

fn parse_desired(text: &str) -> Result<Value> {
    serde_json::from_str(text).context("Desired spec is not valid JSON")
}

fn confirm_delete(subject: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!("Delete {subject}?"))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

// ============================================================================
// Diff
// ============================================================================

fn render(value: Option<&Value>) -> String {
    value
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .map(|s| s + "\n")
        .unwrap_or_default()
}

/// Changed lines between two renderings, prefixed with `-` or `+`.
fn changed_lines(old: &str, new: &str) -> Vec<String> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .filter_map(|change| match change.tag() {
            ChangeTag::Delete => Some(format!("- {change}")),
            ChangeTag::Insert => Some(format!("+ {change}")),
            ChangeTag::Equal => None,
        })
        .collect()
}

fn print_diff(before: Option<ExistingResource>, outcome: &ReconciliationOutcome) {
    let before = before.map(ExistingResource::into_value);
    let after = match outcome.action {
        Action::Delete => None,
        Action::Create | Action::Update => outcome.resource.as_ref(),
        Action::Noop => before.as_ref(),
    };

    let lines = changed_lines(&render(before.as_ref()), &render(after));
    if lines.is_empty() {
        eprintln!("    {}", "(no changes)".dimmed());
        return;
    }
    for line in lines {
        if line.starts_with('-') {
            eprint!("    {}", line.red());
        } else {
            eprint!("    {}", line.green());
        }
    }
}
