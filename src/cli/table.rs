//! Table builder wrapper around comfy-table for consistent list display.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::{style, StyledObject};

use crate::domain::models::SessionVerdict;

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Session verdict colored for terminals. `console` drops styling when
/// stdout is not a TTY.
pub fn styled_verdict(verdict: Option<SessionVerdict>) -> StyledObject<&'static str> {
    match verdict {
        Some(SessionVerdict::Converged) => style("converged").green().bold(),
        Some(SessionVerdict::Exhausted) => style("exhausted").yellow(),
        Some(SessionVerdict::Aborted) => style("aborted").red().bold(),
        None => style("open").dim(),
    }
}
