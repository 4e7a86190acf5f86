//! Table formatting utilities for CLI output.

use comfy_table::{presets, ContentArrangement, Table};
use weft::Program;

/// Format a summary of compiled templates as an ASCII table.
pub fn format_bundle_table<'a>(programs: impl IntoIterator<Item = &'a Program>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_BORDERS_ONLY);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Template", "Extends", "Blocks", "Macros", "Async"]);

    for program in programs {
        table.add_row(vec![
            program.name.clone(),
            if program.parent.is_some() { "yes" } else { "" }.to_string(),
            program.blocks.len().to_string(),
            program.macros.len().to_string(),
            if program.is_async { "yes" } else { "no" }.to_string(),
        ]);
    }

    table
}
