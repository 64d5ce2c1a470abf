use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use tracing::{info, instrument, warn};

use crate::error::{EstimateError, Result};
use crate::io::{COLUMNS, SHEET_NAME, SUMMARY_MARKER, format_amount};
use crate::model::{EstimateTable, LineItem};
use crate::path_guard::FileReference;

const AMOUNT_FORMAT: &str = "#,##0.00";
const HEADER_FILL: u32 = 0xD3D3D3;
const MIN_COLUMN_WIDTH: usize = 10;
const WIDTH_PADDING: f64 = 1.2;
/// Columns rendered as centered amounts: quantity, unit price, total.
const AMOUNT_COLUMNS: [usize; 3] = [1, 3, 4];

/// What happened to the backup copy written after a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Written(PathBuf),
    Failed { path: PathBuf, reason: String },
}

/// Outcome of a successful primary save.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    /// Value written into the summary row.
    pub total: f64,
    pub backup: BackupOutcome,
}

/// Saves `table` to `target` and writes a timestamped backup next to it.
pub fn save(table: &EstimateTable, target: &FileReference) -> Result<SavedArtifact> {
    save_at(table, target, Local::now().naive_local())
}

/// Same as [`save`] with an explicit timestamp for the backup name.
///
/// An empty table is refused before anything is written. The primary file is
/// written to a temporary sibling first and renamed into place, so a failed
/// save leaves neither a partial file nor a backup behind. Backup failures are
/// reported in the returned [`SavedArtifact`] and do not fail the save.
#[instrument(
    level = "info",
    skip_all,
    fields(path = %target.path().display(), items = table.len())
)]
pub fn save_at(
    table: &EstimateTable,
    target: &FileReference,
    timestamp: NaiveDateTime,
) -> Result<SavedArtifact> {
    if table.is_empty() {
        return Err(EstimateError::EmptyTable);
    }

    let bytes = render_workbook(table)?;
    write_file(target.path(), &bytes)?;
    let total = table.total_cost();
    info!(total, "estimate saved");

    let backup_path = target
        .directory()
        .join(backup_file_name(&target.file_name(), timestamp));
    let backup = match write_file(&backup_path, &bytes) {
        Ok(()) => {
            info!(backup = %backup_path.display(), "backup written");
            BackupOutcome::Written(backup_path)
        }
        Err(error) => {
            warn!(backup = %backup_path.display(), %error, "backup failed");
            BackupOutcome::Failed {
                path: backup_path,
                reason: error.to_string(),
            }
        }
    };

    Ok(SavedArtifact {
        path: target.path().to_path_buf(),
        total,
        backup,
    })
}

/// `backup_<YYYYMMDD_HHMMSS>_<original>`.
pub fn backup_file_name(original: &str, timestamp: NaiveDateTime) -> String {
    format!("backup_{}_{original}", timestamp.format("%Y%m%d_%H%M%S"))
}

struct CellFormats {
    header: Format,
    text: Format,
    amount: Format,
    summary_text: Format,
    summary_amount: Format,
}

impl CellFormats {
    fn new() -> Self {
        let bordered = Format::new()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::VerticalCenter);
        let text = bordered.clone().set_align(FormatAlign::Left);
        let amount = bordered
            .set_align(FormatAlign::Center)
            .set_num_format(AMOUNT_FORMAT);

        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_border(FormatBorder::Thin),
            summary_text: text.clone().set_bold(),
            summary_amount: amount.clone().set_bold(),
            text,
            amount,
        }
    }

    fn for_column(&self, col: usize, summary: bool) -> &Format {
        match (AMOUNT_COLUMNS.contains(&col), summary) {
            (true, false) => &self.amount,
            (true, true) => &self.summary_amount,
            (false, false) => &self.text,
            (false, true) => &self.summary_text,
        }
    }
}

/// Cell content of one output row, data or summary.
enum CellValue<'a> {
    Text(&'a str),
    Amount(f64),
    Blank,
}

impl CellValue<'_> {
    fn display(&self) -> String {
        match self {
            CellValue::Text(text) => text.to_string(),
            CellValue::Amount(value) => format_amount(*value),
            CellValue::Blank => String::new(),
        }
    }
}

fn item_cells(item: &LineItem) -> [CellValue<'_>; 7] {
    [
        CellValue::Text(item.name()),
        CellValue::Amount(item.quantity()),
        CellValue::Text(item.unit()),
        CellValue::Amount(item.unit_price()),
        CellValue::Amount(item.total()),
        CellValue::Text(item.category()),
        CellValue::Text(item.description()),
    ]
}

fn summary_cells(total: f64) -> [CellValue<'static>; 7] {
    [
        CellValue::Text(SUMMARY_MARKER),
        CellValue::Blank,
        CellValue::Blank,
        CellValue::Blank,
        CellValue::Amount(total),
        CellValue::Blank,
        CellValue::Blank,
    ]
}

/// Builds the styled workbook for `table`: header, one row per item, and the
/// summary row.
fn render_workbook(table: &EstimateTable) -> Result<Vec<u8>> {
    let formats = CellFormats::new();
    let mut rows: Vec<[CellValue<'_>; 7]> = table.items().iter().map(item_cells).collect();
    rows.push(summary_cells(table.total_cost()));

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col_idx, header) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, *header, &formats.header)?;
    }

    let summary_row = rows.len() - 1;
    for (row_idx, cells) in rows.iter().enumerate() {
        let is_summary = row_idx == summary_row;
        for (col_idx, cell) in cells.iter().enumerate() {
            let format = formats.for_column(col_idx, is_summary);
            write_cell(worksheet, (row_idx + 1) as u32, col_idx as u16, cell, format)?;
        }
    }

    for (col_idx, width) in column_widths(&rows).into_iter().enumerate() {
        worksheet.set_column_width(col_idx as u16, width)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue<'_>,
    format: &Format,
) -> Result<()> {
    match cell {
        CellValue::Text(text) if !text.is_empty() => {
            worksheet.write_string_with_format(row, col, *text, format)?;
        }
        CellValue::Amount(value) => {
            worksheet.write_number_with_format(row, col, *value, format)?;
        }
        CellValue::Text(_) | CellValue::Blank => {
            worksheet.write_blank(row, col, format)?;
        }
    }
    Ok(())
}

/// Width of each column: the longest displayed value (header included, never
/// less than the minimum) scaled by the padding factor.
fn column_widths(rows: &[[CellValue<'_>; 7]]) -> [f64; 7] {
    let mut widths = [0.0; 7];
    for (col_idx, header) in COLUMNS.iter().enumerate() {
        let longest = rows
            .iter()
            .map(|cells| cells[col_idx].display().chars().count())
            .chain([header.chars().count(), MIN_COLUMN_WIDTH])
            .max()
            .unwrap_or(MIN_COLUMN_WIDTH);
        widths[col_idx] = longest as f64 * WIDTH_PADDING;
    }
    widths
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if fs::metadata(path).is_ok_and(|metadata| metadata.permissions().readonly()) {
        return Err(EstimateError::PermissionDenied(path.to_path_buf()));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    result.map_err(|error| {
        let _ = fs::remove_file(&temp_path);
        EstimateError::from_io(error, path)
    })
}
