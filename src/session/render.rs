use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use crate::files::FileEntry;
use crate::io::{self, format_amount};
use crate::model::LineItem;

/// Line items with their 1-based position in the stored table.
pub(crate) fn item_table<'a>(rows: impl IntoIterator<Item = (usize, &'a LineItem)>) -> Table {
    let mut table = styled_table();
    let mut header = vec![Cell::new("Nr")];
    header.extend(io::COLUMNS.iter().map(|label| Cell::new(*label)));
    table.set_header(header);

    for (index, item) in rows {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(item.name()),
            Cell::new(format_amount(item.quantity())),
            Cell::new(item.unit()),
            Cell::new(format_amount(item.unit_price())),
            Cell::new(format_amount(item.total())),
            Cell::new(item.category()),
            Cell::new(item.description()),
        ]);
    }

    for column in [0, 2, 4, 5] {
        align_column(&mut table, column, CellAlignment::Right);
    }
    table
}

/// Estimate files with their 1-based pick number.
pub(crate) fn file_table(entries: &[FileEntry]) -> Table {
    let mut table = styled_table();
    table.set_header(vec!["Nr", "File", "Size (bytes)"]);
    for (index, entry) in entries.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&entry.name),
            Cell::new(entry.size),
        ]);
    }
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    table
}

/// Summary line printed under a table.
pub(crate) fn total_line(label: &str, total: f64) -> String {
    format!("{label}: {} PLN", format_amount(total))
}

/// Numbered options, one per line.
pub(crate) fn numbered<S: AsRef<str>>(options: &[S]) -> Vec<String> {
    options
        .iter()
        .enumerate()
        .map(|(index, option)| format!("  {}. {}", index + 1, option.as_ref()))
        .collect()
}

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
