//! `scmctl show`: locate one resource.

use super::{Session, print_json, resource_type, target_label};
use crate::Context;
use crate::cli::{ConnectionArgs, TargetArgs};
use crate::ui;
use anyhow::Result;
use scmkit::{ErrorDescriptor, ExistingResource};
use serde_json::Value;
use std::process::ExitCode;

pub fn run(ctx: &Context, connection: &ConnectionArgs, target: TargetArgs) -> Result<ExitCode> {
    let resource = resource_type(&target.resource_type)?;
    let container = target.container.selection();
    let key = target.key.key();
    let subject = target_label(&resource, &container, &key);

    let mut session = Session::open(ctx, connection)?;
    let found = session.client.locate(&resource, &container, &key);
    session.persist_token();

    match found {
        Ok(Some(existing)) => {
            print_json(&existing.clone().into_value())?;
            if !ctx.quiet {
                ui::success(&found_message(&subject, &existing));
            }
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => {
            print_json(&Value::Null)?;
            if !ctx.quiet {
                ui::warn(&format!("{subject} not found"));
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            let error = ErrorDescriptor::from(&e);
            print_json(&serde_json::json!({ "error": error }))?;
            ui::error(&format!("{subject}: {error}"));
            ui::dim(error.advice());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn found_message(subject: &str, existing: &ExistingResource) -> String {
    format!("found {subject} (id {})", existing.id)
}
