use std::fs;
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;
use wycennik::EstimateError;
use wycennik::io::{self, BackupOutcome, COLUMNS, SUMMARY_MARKER, WarningKind};
use wycennik::model::{EstimateTable, ItemDraft, LineItem};
use wycennik::path_guard::{FileReference, PathGuard};

fn sample_table() -> EstimateTable {
    [
        ItemDraft::new("Płytki ścienne", 12.5, "m²", 89.99, "Materials")
            .with_description("Łazienka, biały połysk"),
        ItemDraft::new("Montaż", 16.0, "godz", 120.0, "Labor"),
        ItemDraft::new("Szafka", 1.0, "szt", 1450.0, "Furniture"),
    ]
    .into_iter()
    .map(|draft| LineItem::new(draft).expect("valid item"))
    .collect()
}

fn target(root: &Path, name: &str) -> FileReference {
    let guard = PathGuard::new(root);
    guard
        .file_in(guard.root(), name)
        .expect("name accepted inside the root")
}

fn timestamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 14)
        .and_then(|date| date.and_hms_opt(9, 5, 7))
        .expect("valid timestamp")
}

fn first_sheet_rows(path: &Path) -> Vec<Vec<DataType>> {
    let mut workbook: Xlsx<_> = open_workbook(path).expect("workbook opened");
    let name = workbook.sheet_names()[0].clone();
    let range = workbook
        .worksheet_range(&name)
        .expect("sheet present")
        .expect("sheet read");
    range.rows().map(|row| row.to_vec()).collect()
}

fn write_workbook(path: &Path, rows: &[Vec<&str>]) {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(number) => worksheet
                    .write_number(row_idx as u32, col_idx as u16, number)
                    .expect("number written"),
                Err(_) => worksheet
                    .write_string(row_idx as u32, col_idx as u16, *value)
                    .expect("string written"),
            };
        }
    }
    workbook.save(path).expect("workbook saved");
}

#[test]
fn saved_estimate_loads_back_unchanged() {
    let temp_dir = tempdir().expect("temporary directory");
    let table = sample_table();
    let reference = target(temp_dir.path(), "kosztorys");

    let artifact = io::save_at(&table, &reference, timestamp()).expect("estimate saved");
    let loaded = io::load(&artifact.path).expect("estimate loaded");

    assert_eq!(loaded.table, table);
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
}

#[test]
fn summary_row_carries_the_grand_total() {
    let temp_dir = tempdir().expect("temporary directory");
    let table = sample_table();
    let reference = target(temp_dir.path(), "kosztorys.xlsx");

    let artifact = io::save_at(&table, &reference, timestamp()).expect("estimate saved");
    assert_eq!(artifact.total, table.total_cost());

    let rows = first_sheet_rows(&artifact.path);
    let header: Vec<String> = rows[0].iter().map(|cell| cell.to_string()).collect();
    assert_eq!(header, COLUMNS);
    assert_eq!(rows.len(), table.len() + 2);

    let summary = rows.last().expect("summary row");
    assert_eq!(summary[0], DataType::String(SUMMARY_MARKER.to_string()));
    assert_eq!(summary[4], DataType::Float(table.total_cost()));
    assert!(summary[1].is_empty());
}

#[test]
fn backup_is_written_next_to_the_estimate() {
    let temp_dir = tempdir().expect("temporary directory");
    let table = sample_table();
    let reference = target(temp_dir.path(), "kosztorys");

    let artifact = io::save_at(&table, &reference, timestamp()).expect("estimate saved");
    let expected = reference
        .directory()
        .join("backup_20260314_090507_kosztorys.xlsx");
    assert_eq!(artifact.backup, BackupOutcome::Written(expected.clone()));

    let backup = io::load(&expected).expect("backup loaded");
    assert_eq!(backup.table, table);
}

#[test]
fn empty_table_writes_nothing() {
    let temp_dir = tempdir().expect("temporary directory");
    let reference = target(temp_dir.path(), "pusty");

    let result = io::save_at(&EstimateTable::new(), &reference, timestamp());

    assert!(matches!(result, Err(EstimateError::EmptyTable)));
    let entries = fs::read_dir(temp_dir.path()).expect("listing").count();
    assert_eq!(entries, 0);
}

#[test]
fn missing_columns_are_a_schema_mismatch() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("stary.xlsx");
    write_workbook(
        &path,
        &[
            vec!["Pozycja", "Ilość", "Jednostka", "Cena jednostkowa (PLN)"],
            vec!["Cement", "10", "kg", "5"],
        ],
    );

    match io::load(&path) {
        Err(EstimateError::SchemaMismatch { missing }) => {
            assert_eq!(missing, vec!["Koszt całkowity (PLN)", "Kategoria", "Opis"]);
        }
        other => panic!("expected a schema mismatch, got {other:?}"),
    }
}

#[test]
fn unusable_cells_are_coerced_with_warnings() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("reczny.xlsx");
    write_workbook(
        &path,
        &[
            COLUMNS.to_vec(),
            vec!["Cement", "abc", "kg", "5", "0", "Materials", ""],
            vec!["Farba", "-2", "l", "30", "0", "Materials", ""],
            vec!["Piasek", "2", "t", "100", "150", "Materials", ""],
            vec!["", "3", "szt", "10", "30", "", ""],
            vec!["Kabel", "4", "m", "", "", "Materials", "miedź"],
            vec![SUMMARY_MARKER, "", "", "", "180", "", ""],
        ],
    );

    let loaded = io::load(&path).expect("estimate loaded");

    let names: Vec<&str> = loaded.table.items().iter().map(LineItem::name).collect();
    assert_eq!(names, ["Cement", "Farba", "Piasek", "Kabel"]);
    assert_eq!(loaded.table.items()[0].quantity(), 0.0);
    assert_eq!(loaded.table.items()[1].quantity(), 0.0);
    assert_eq!(loaded.table.items()[2].total(), 200.0);
    assert_eq!(loaded.table.total_cost(), 200.0);

    let kinds: Vec<(usize, &str, &WarningKind)> = loaded
        .warnings
        .iter()
        .map(|warning| (warning.row, warning.column, &warning.kind))
        .collect();
    assert!(kinds.contains(&(2, "Ilość", &WarningKind::NotNumeric)));
    assert!(kinds.contains(&(3, "Ilość", &WarningKind::OutOfRange)));
    assert!(kinds.contains(&(
        4,
        "Koszt całkowity (PLN)",
        &WarningKind::StaleTotal { recomputed: 200.0 }
    )));
    assert!(kinds.contains(&(5, "Pozycja", &WarningKind::MissingName)));
    assert!(kinds.contains(&(6, "Cena jednostkowa (PLN)", &WarningKind::Blank)));
}

#[test]
fn missing_file_is_reported() {
    let temp_dir = tempdir().expect("temporary directory");
    let result = io::load(&temp_dir.path().join("brak.xlsx"));
    assert!(matches!(result, Err(EstimateError::FileMissing(_))));
}

#[cfg(unix)]
#[test]
fn read_only_target_is_refused_without_a_backup() {
    let temp_dir = tempdir().expect("temporary directory");
    let reference = target(temp_dir.path(), "kosztorys");
    io::save_at(&sample_table(), &reference, timestamp()).expect("first save");
    let before = fs::read(reference.path()).expect("file read");

    let mut permissions = fs::metadata(reference.path()).expect("metadata").permissions();
    permissions.set_readonly(true);
    fs::set_permissions(reference.path(), permissions).expect("permissions set");

    let later = NaiveDate::from_ymd_opt(2026, 3, 15)
        .and_then(|date| date.and_hms_opt(10, 0, 0))
        .expect("valid timestamp");
    let result = io::save_at(&sample_table(), &reference, later);

    assert!(matches!(result, Err(EstimateError::PermissionDenied(_))));
    assert_eq!(fs::read(reference.path()).expect("file read"), before);
    assert!(
        !reference
            .directory()
            .join("backup_20260315_100000_kosztorys.xlsx")
            .exists()
    );
}

#[test]
fn only_the_summary_marker_itself_is_dropped_on_load() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut table = EstimateTable::new();
    let refused = table.add(ItemDraft::new(SUMMARY_MARKER, 1.0, "szt", 10.0, ""));
    assert!(matches!(refused, Err(EstimateError::ReservedItemName(_))));
    for name in ["Razem", "RAZEM 2", "Podsumowanie"] {
        table
            .add(ItemDraft::new(name, 2.0, "szt", 10.0, "Materials"))
            .expect("name accepted");
    }
    let reference = target(temp_dir.path(), "podobne");

    let artifact = io::save_at(&table, &reference, timestamp()).expect("estimate saved");
    let loaded = io::load(&artifact.path).expect("estimate loaded");

    assert_eq!(loaded.table, table);
    assert_eq!(loaded.table.total_cost(), 60.0);
}
