use std::fs;
use std::path::Path;

use tempfile::tempdir;
use wycennik::config::Settings;
use wycennik::io;
use wycennik::model::{ItemDraft, LineItem};
use wycennik::path_guard::PathGuard;
use wycennik::session::{ScriptedTerminal, Session, SessionState, Shell};

// Menu entry, name, quantity, unit pick (kg / m²), unit price, category, description.
const ADD_CEMENT: [&str; 7] = ["3", "Cement", "10", "5", "5", "Materials", ""];
const ADD_TILES: [&str; 7] = ["3", "Płytki", "4", "2", "80", "Wykończenie", "Łazienka"];

fn run_with(settings: Settings, answers: &[&str]) -> (Session, ScriptedTerminal) {
    let mut shell = Shell::new(
        Session::new(settings),
        ScriptedTerminal::new(answers.iter().copied()),
    );
    shell.run().expect("shell finished");
    shell.into_parts()
}

fn run(root: &Path, answers: &[&str]) -> (Session, ScriptedTerminal) {
    run_with(Settings::for_root(root), answers)
}

fn script<'a>(parts: &[&[&'a str]]) -> Vec<&'a str> {
    parts.iter().flat_map(|part| part.iter().copied()).collect()
}

fn saved_estimate(root: &Path, name: &str) {
    let table = [
        ItemDraft::new("Cement", 10.0, "kg", 5.0, "Materials"),
        ItemDraft::new("Montaż", 8.0, "godz", 120.0, "Labor"),
        ItemDraft::new("Szafka", 1.0, "szt", 1450.0, "Furniture"),
    ]
    .into_iter()
    .map(|draft| LineItem::new(draft).expect("valid item"))
    .collect();
    let guard = PathGuard::new(root);
    let reference = guard.file_in(guard.root(), name).expect("valid name");
    io::save(&table, &reference).expect("estimate saved");
}

#[test]
fn added_item_is_saved_with_a_backup() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[&ADD_CEMENT, &["8", "", "y"], &["11"]]);

    let (session, terminal) = run(temp_dir.path(), &answers);

    assert_eq!(session.state(), SessionState::Saved);
    let root = session.guard().root().to_path_buf();
    let loaded = io::load(&root.join("wycennik.xlsx")).expect("saved file loads");
    assert_eq!(loaded.table.total_cost(), 50.0);

    let backups = fs::read_dir(&root)
        .expect("listing")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("backup_"))
        .count();
    assert_eq!(backups, 1);
    assert!(terminal.output().contains("Backup: "));
    assert!(terminal.output().contains("Goodbye."));
}

#[test]
fn startup_picker_opens_the_chosen_file() {
    let temp_dir = tempdir().expect("temporary directory");
    saved_estimate(temp_dir.path(), "kosztorys");
    for entry in fs::read_dir(temp_dir.path()).expect("listing") {
        let path = entry.expect("entry").path();
        if path.to_string_lossy().contains("backup_") {
            fs::remove_file(path).expect("backup removed");
        }
    }

    let (session, terminal) = run(temp_dir.path(), &["1", "2", "11"]);

    assert_eq!(session.state(), SessionState::FileSelected);
    assert_eq!(session.table().len(), 3);
    assert!(terminal.output().contains("Loaded kosztorys.xlsx: 3 item(s)."));
    assert!(terminal.output().contains("Total: 2,460.00 PLN"));
}

#[test]
fn startup_picker_accepts_enter_for_a_new_estimate() {
    let temp_dir = tempdir().expect("temporary directory");
    saved_estimate(temp_dir.path(), "kosztorys");

    let (session, terminal) = run(temp_dir.path(), &["", "11"]);

    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.table().is_empty());
    assert!(terminal.output().contains("Starting a new estimate."));
}

#[test]
fn startup_argument_loads_the_file() {
    let temp_dir = tempdir().expect("temporary directory");
    saved_estimate(temp_dir.path(), "kosztorys");
    let settings = Settings::resolve(
        Some(Path::new("kosztorys.xlsx")),
        None,
        temp_dir.path(),
    )
    .expect("settings resolved");

    let (session, terminal) = run_with(settings, &["11"]);

    assert_eq!(session.table().len(), 3);
    assert!(terminal.output().contains("Loaded kosztorys.xlsx: 3 item(s)."));
}

#[test]
fn exit_with_unsaved_changes_asks_first() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[&ADD_CEMENT, &["11", "n"], &["11", "y"]]);

    let (session, terminal) = run(temp_dir.path(), &answers);

    assert!(session.is_modified());
    let output = terminal.output();
    assert_eq!(output.matches("There are unsaved changes").count(), 2);
    assert_eq!(output.matches("Goodbye.").count(), 1);
    assert_eq!(fs::read_dir(temp_dir.path()).expect("listing").count(), 0);
}

#[test]
fn end_of_input_leaves_without_saving() {
    let temp_dir = tempdir().expect("temporary directory");

    let (session, terminal) = run(temp_dir.path(), &ADD_CEMENT);

    assert!(session.is_modified());
    assert_eq!(terminal.remaining_answers(), 0);
    assert_eq!(fs::read_dir(temp_dir.path()).expect("listing").count(), 0);
}

#[test]
fn edit_keeps_values_left_empty() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[
        &ADD_TILES,
        &["4", "1", "", "20", "", "", "", ""],
        &["11", "y"],
    ]);

    let (session, _) = run(temp_dir.path(), &answers);

    let item = &session.table().items()[0];
    assert_eq!(item.name(), "Płytki");
    assert_eq!(item.quantity(), 20.0);
    assert_eq!(item.unit(), "m²");
    assert_eq!(item.category(), "Wykończenie");
    assert_eq!(item.description(), "Łazienka");
    assert_eq!(item.total(), 1600.0);
}

#[test]
fn sorted_order_decides_which_item_is_deleted() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[
        &ADD_CEMENT,
        &ADD_TILES,
        &["6", "4"],
        &["5", "1", "y"],
        &["11", "y"],
    ]);

    let (session, terminal) = run(temp_dir.path(), &answers);

    let names: Vec<&str> = session.table().items().iter().map(LineItem::name).collect();
    assert_eq!(names, ["Cement"]);
    assert!(terminal.output().contains("Deleted 'Płytki'."));
}

#[test]
fn category_filter_shows_a_subtotal() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[
        &ADD_CEMENT,
        &ADD_TILES,
        &["7", "1", "1"],
        &["11", "y"],
    ]);

    let (_, terminal) = run(temp_dir.path(), &answers);

    assert!(terminal.output().contains("Total for 'Materials': 50.00 PLN"));
}

#[test]
fn renaming_the_open_file_keeps_it_open() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[
        &ADD_CEMENT,
        &["8", "remont", "y"],
        &["10", "2", "2", "lazienka"],
        &["11"],
    ]);

    let (session, terminal) = run(temp_dir.path(), &answers);

    let current = session.current_file().expect("a file is open");
    assert_eq!(current.file_name(), "lazienka.xlsx");
    assert!(current.path().is_file());
    assert!(terminal.output().contains("lazienka.xlsx"));
}

#[test]
fn deleting_the_open_file_asks_before_dropping_changes() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[
        &ADD_CEMENT,
        &["8", "remont", "y"],
        &ADD_TILES,
        &["10", "3", "2", "y", "n"],
        &["10", "3", "2", "y", "y"],
        &["11"],
    ]);

    let (session, terminal) = run(temp_dir.path(), &answers);

    let output = terminal.output();
    assert_eq!(output.matches("Unsaved changes will be lost").count(), 2);
    assert!(output.contains("Kept."));
    assert!(output.contains("It was the open estimate; starting a new one."));
    assert!(session.current_file().is_none());
    assert!(session.table().is_empty());
    assert!(!session.guard().root().join("remont.xlsx").exists());
}

#[test]
fn edit_prompts_show_defaults_that_parse_back() {
    let temp_dir = tempdir().expect("temporary directory");
    let answers = script(&[
        &["3", "Szafka", "2", "szt", "1,234.50", "Furniture", ""],
        &["4", "1", "", "", "", "1234.50", "", ""],
        &["11", "y"],
    ]);

    let (session, terminal) = run(temp_dir.path(), &answers);

    let output = terminal.output();
    assert!(output.contains("Quantity [2.00]: "));
    assert!(output.contains("Unit price (PLN) [1234.50]: 1234.50"));
    assert!(!output.contains("is not a number"));
    let item = &session.table().items()[0];
    assert_eq!(item.unit_price(), 1234.5);
    assert_eq!(item.total(), 2469.0);
}
