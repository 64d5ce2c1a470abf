//! Spreadsheet persistence of estimate tables.
//!
//! [`excel_write`] produces the styled workbook (data rows, summary row, and
//! a timestamped backup copy), [`excel_read`] turns such a workbook back into
//! an [`EstimateTable`](crate::model::EstimateTable).

pub mod excel_read;
pub mod excel_write;

pub use excel_read::{CellWarning, LoadedEstimate, WarningKind, load};
pub use excel_write::{BackupOutcome, SavedArtifact, backup_file_name, save, save_at};

/// Name written in the first column of the summary row.
pub const SUMMARY_MARKER: &str = "RAZEM";

/// Name of the worksheet holding the estimate.
pub const SHEET_NAME: &str = "Kosztorys";

pub const COL_NAME: &str = "Pozycja";
pub const COL_QUANTITY: &str = "Ilość";
pub const COL_UNIT: &str = "Jednostka";
pub const COL_UNIT_PRICE: &str = "Cena jednostkowa (PLN)";
pub const COL_TOTAL: &str = "Koszt całkowity (PLN)";
pub const COL_CATEGORY: &str = "Kategoria";
pub const COL_DESCRIPTION: &str = "Opis";

/// Header row, in file order.
pub const COLUMNS: [&str; 7] = [
    COL_NAME,
    COL_QUANTITY,
    COL_UNIT,
    COL_UNIT_PRICE,
    COL_TOTAL,
    COL_CATEGORY,
    COL_DESCRIPTION,
];

/// Formats an amount with two decimals and comma thousands separators, the
/// way the `#,##0.00` cell format displays it.
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, digit) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}
