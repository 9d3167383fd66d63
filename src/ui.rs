//! Terminal output helpers.
//!
//! Everything here writes to stderr; stdout carries command output.

use colored::Colorize;
use scmkit::{Action, ReconciliationOutcome};

/// Print a success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    eprintln!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    eprintln!();
    eprintln!("{}", title.bold());
    eprintln!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    eprintln!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Outcome Formatting
// ============================================================================

/// One-line description of an outcome, without color.
pub fn describe(outcome: &ReconciliationOutcome, subject: &str) -> String {
    if let Some(error) = &outcome.error {
        let hint = if error.retryable { ", retryable" } else { "" };
        return format!("{subject}: {} [{}{hint}]", error.message, error.kind);
    }

    let verb = match (outcome.action, outcome.dry_run) {
        (Action::Create, false) => "created",
        (Action::Create, true) => "would be created",
        (Action::Update, false) => "updated",
        (Action::Update, true) => "would be updated",
        (Action::Delete, false) => "deleted",
        (Action::Delete, true) => "would be deleted",
        (Action::Noop, _) => "already up to date",
    };
    format!("{subject} {verb}")
}

/// Print the colored summary line for an outcome.
pub fn summary(outcome: &ReconciliationOutcome, subject: &str) {
    let line = describe(outcome, subject);
    match &outcome.error {
        Some(error) => {
            self::error(&line);
            dim(error.advice());
        }
        None if outcome.changed && outcome.dry_run => {
            eprintln!("{} {}", "~".yellow(), line);
        }
        None if outcome.changed => success(&line),
        None => eprintln!("{} {}", "=".dimmed(), line.dimmed()),
    }
}
