use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use tracing::{info, instrument, warn};

use crate::error::{EstimateError, Result};
use crate::io::{
    COL_CATEGORY, COL_DESCRIPTION, COL_NAME, COL_QUANTITY, COL_TOTAL, COL_UNIT, COL_UNIT_PRICE,
    COLUMNS, SUMMARY_MARKER,
};
use crate::model::{EstimateTable, ItemDraft, LineItem, validate_amount};

/// Largest difference between a stored and a recomputed total that is still
/// treated as equal.
const TOTAL_TOLERANCE: f64 = 0.005;

/// Result of reading an estimate file: the table plus every cell that had to
/// be coerced on the way in.
#[derive(Debug, Clone, Default)]
pub struct LoadedEstimate {
    pub table: EstimateTable,
    pub warnings: Vec<CellWarning>,
}

/// Why a cell was not taken at face value.
#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    /// The cell is empty; 0 was used.
    Blank,
    /// The cell holds something that is not a number; 0 was used.
    NotNumeric,
    /// The number is negative or too large; 0 was used.
    OutOfRange,
    /// The stored total differs from quantity × unit price; the recomputed
    /// value wins.
    StaleTotal { recomputed: f64 },
    /// The row has data but no name and was skipped.
    MissingName,
}

/// A non-fatal problem found in one cell of the input file.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWarning {
    /// 1-based spreadsheet row number.
    pub row: usize,
    pub column: &'static str,
    pub raw: String,
    pub kind: WarningKind,
}

impl fmt::Display for CellWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}, column '{}': ", self.row, self.column)?;
        match &self.kind {
            WarningKind::Blank => write!(f, "empty cell, using 0"),
            WarningKind::NotNumeric => write!(f, "'{}' is not a number, using 0", self.raw),
            WarningKind::OutOfRange => write!(f, "{} is out of range, using 0", self.raw),
            WarningKind::StaleTotal { recomputed } => write!(
                f,
                "stored total {} does not match quantity × price, using {recomputed}",
                self.raw
            ),
            WarningKind::MissingName => write!(f, "row has no name and was skipped"),
        }
    }
}

/// Reads an estimate table from the first worksheet of `path`.
///
/// The summary row is dropped, and numeric cells that can not be used are
/// replaced by 0 and reported through [`LoadedEstimate::warnings`].
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<LoadedEstimate> {
    if !path.is_file() {
        return Err(EstimateError::FileMissing(path.to_path_buf()));
    }

    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = read_first_sheet(&mut workbook)?;
    let columns = locate_columns(&range)?;
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    let mut warnings = Vec::new();
    let mut items = Vec::new();

    for (offset, row) in range.rows().enumerate().skip(1) {
        let row_number = first_row + offset + 1;
        let mut reader = RowReader {
            row,
            row_number,
            columns: &columns,
            warnings: &mut warnings,
        };
        if let Some(item) = reader.line_item()? {
            items.push(item);
        }
    }

    for warning in &warnings {
        warn!(%warning, "coerced cell while loading");
    }
    let table: EstimateTable = items.into_iter().collect();
    info!(item_count = table.len(), warning_count = warnings.len(), "estimate loaded");
    Ok(LoadedEstimate { table, warnings })
}

fn read_first_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
) -> Result<Range<DataType>> {
    let sheet_names = workbook.sheet_names().to_owned();
    let Some(name) = sheet_names.first() else {
        return Err(schema_mismatch(&HashMap::new()));
    };
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| schema_mismatch(&HashMap::new()))?;
    let range = range_result.map_err(EstimateError::from)?;
    Ok(range)
}

fn locate_columns(range: &Range<DataType>) -> Result<HashMap<&'static str, usize>> {
    let headers: Vec<String> = match range.rows().next() {
        Some(first_row) => first_row
            .iter()
            .map(|cell| cell_to_string(Some(cell)).trim().to_string())
            .collect(),
        None => Vec::new(),
    };

    let columns: HashMap<&'static str, usize> = COLUMNS
        .iter()
        .filter_map(|column| {
            headers
                .iter()
                .position(|header| header == column)
                .map(|idx| (*column, idx))
        })
        .collect();

    if columns.len() == COLUMNS.len() {
        Ok(columns)
    } else {
        Err(schema_mismatch(&columns))
    }
}

fn schema_mismatch(found: &HashMap<&'static str, usize>) -> EstimateError {
    EstimateError::SchemaMismatch {
        missing: COLUMNS
            .iter()
            .filter(|column| !found.contains_key(*column))
            .map(|column| column.to_string())
            .collect(),
    }
}

struct RowReader<'a> {
    row: &'a [DataType],
    row_number: usize,
    columns: &'a HashMap<&'static str, usize>,
    warnings: &'a mut Vec<CellWarning>,
}

impl RowReader<'_> {
    fn line_item(&mut self) -> Result<Option<LineItem>> {
        if self.row.iter().all(|cell| matches!(cell, DataType::Empty)) {
            return Ok(None);
        }

        let name = self.text(COL_NAME);
        if name == SUMMARY_MARKER {
            return Ok(None);
        }
        if name.is_empty() {
            self.warn(COL_NAME, String::new(), WarningKind::MissingName);
            return Ok(None);
        }

        let quantity = self.amount(COL_QUANTITY).unwrap_or(0.0);
        let unit_price = self.amount(COL_UNIT_PRICE).unwrap_or(0.0);
        let recomputed = quantity * unit_price;
        if let Some(stored_total) = self.number(COL_TOTAL) {
            if (stored_total - recomputed).abs() > TOTAL_TOLERANCE {
                self.warn(
                    COL_TOTAL,
                    stored_total.to_string(),
                    WarningKind::StaleTotal { recomputed },
                );
            }
        }

        let draft = ItemDraft {
            name,
            quantity,
            unit: self.text(COL_UNIT),
            unit_price,
            category: self.text(COL_CATEGORY),
            description: self.text(COL_DESCRIPTION),
        };
        LineItem::new(draft).map(Some)
    }

    fn cell(&self, column: &'static str) -> Option<&DataType> {
        self.columns
            .get(column)
            .and_then(|idx| self.row.get(*idx))
    }

    fn text(&self, column: &'static str) -> String {
        cell_to_string(self.cell(column)).trim().to_string()
    }

    /// Quantity or price in the accepted range, or `None` (with a warning
    /// recorded) when it has to be replaced by 0.
    fn amount(&mut self, column: &'static str) -> Option<f64> {
        let value = self.number(column)?;
        match validate_amount(column, value) {
            Ok(value) => Some(value),
            Err(_) => {
                self.warn(column, value.to_string(), WarningKind::OutOfRange);
                None
            }
        }
    }

    fn number(&mut self, column: &'static str) -> Option<f64> {
        let coerced = match self.cell(column) {
            Some(DataType::Float(value)) => Ok(*value),
            Some(DataType::Int(value)) => Ok(*value as f64),
            Some(DataType::String(value)) if value.trim().is_empty() => Err(WarningKind::Blank),
            Some(DataType::String(value)) => value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or(WarningKind::NotNumeric),
            Some(DataType::Empty) | None => Err(WarningKind::Blank),
            Some(_) => Err(WarningKind::NotNumeric),
        };

        match coerced {
            Ok(value) => Some(value),
            Err(kind) => {
                let raw = cell_to_string(self.cell(column));
                self.warn(column, raw, kind);
                None
            }
        }
    }

    fn warn(&mut self, column: &'static str, raw: String, kind: WarningKind) {
        self.warnings.push(CellWarning {
            row: self.row_number,
            column,
            raw,
            kind,
        });
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
