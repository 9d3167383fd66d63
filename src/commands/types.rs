//! `scmctl types`: the resource catalogue.

use colored::Colorize;
use scmkit::ResourceType;

pub fn run() {
    for line in rows(ResourceType::all()) {
        println!("{line}");
    }
}

fn rows(types: &[ResourceType]) -> Vec<String> {
    let width = types.iter().map(|t| t.name.len()).max().unwrap_or(0);
    types
        .iter()
        .map(|t| {
            let mut line = format!("{:<width$}  {}", t.name, t.path.dimmed());
            if !t.ordered_fields.is_empty() {
                line.push_str(&format!("  ordered: {}", t.ordered_fields.join(", ")));
            }
            line
        })
        .collect()
}
