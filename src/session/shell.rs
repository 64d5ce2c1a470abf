//! Menu loop driving a [`Session`] from a [`Terminal`].
//!
//! Every command runs to completion before the next menu is shown. Failures
//! are reported and the loop goes on; only terminal errors end it, and an
//! exhausted input ends it quietly.

use std::io;
use std::path::{Path, PathBuf};
use std::ptr;

use tracing::{debug, info};

use crate::error::{EstimateError, Result};
use crate::files::Overwrite;
use crate::io::{BackupOutcome, CellWarning, format_amount};
use crate::model::{ItemChanges, ItemDraft, LineItem, SortDirection, SortKey};
use crate::session::prompt::{self, Answer, Prompt};
use crate::session::render;
use crate::session::terminal::Terminal;
use crate::session::{Discard, Session, StartupOutcome};

const MENU: [&str; 11] = [
    "Open an estimate file",
    "Show the estimate",
    "Add an item",
    "Edit an item",
    "Delete an item",
    "Sort items",
    "Filter items",
    "Save",
    "Change folder",
    "Manage files",
    "Exit",
];
const EXIT_CHOICE: usize = 10;

const SORT_OPTIONS: [(&str, SortKey, SortDirection); 4] = [
    ("Name (A-Z)", SortKey::Name, SortDirection::Ascending),
    ("Cost (lowest first)", SortKey::Total, SortDirection::Ascending),
    ("Category (A-Z)", SortKey::Category, SortDirection::Ascending),
    ("Cost (highest first)", SortKey::Total, SortDirection::Descending),
];

const FILTER_OPTIONS: [&str; 2] = ["By category", "By cost range"];

const FILE_OPTIONS: [&str; 4] = [
    "Move a file",
    "Rename a file",
    "Delete a file",
    "Create a folder",
];

enum Flow {
    Continue,
    Exit,
}

pub struct Shell<T: Terminal> {
    session: Session,
    terminal: T,
}

impl<T: Terminal> Shell<T> {
    pub fn new(session: Session, terminal: T) -> Self {
        Self { session, terminal }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn into_parts(self) -> (Session, T) {
        (self.session, self.terminal)
    }

    /// Runs the startup step and then the menu loop until the user exits or
    /// the input ends.
    pub fn run(&mut self) -> Result<()> {
        match self.start().and_then(|()| self.menu_loop()) {
            Err(EstimateError::Terminal(error)) if error.kind() == io::ErrorKind::UnexpectedEof => {
                info!("input closed, leaving");
                Ok(())
            }
            other => other,
        }
    }

    fn menu_loop(&mut self) -> Result<()> {
        loop {
            self.show_menu()?;
            let choice = self
                .ask("Choose an option: ", |raw| prompt::parse_choice(raw, MENU.len()))?
                .unwrap_or(EXIT_CHOICE);

            match self.dispatch(choice) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return Ok(()),
                Err(error @ EstimateError::Terminal(_)) => return Err(error),
                Err(error) => self.report(&error)?,
            }
        }
    }

    fn dispatch(&mut self, choice: usize) -> Result<Flow> {
        debug!(command = MENU.get(choice).copied().unwrap_or_default(), "menu choice");
        match choice {
            0 => self.open_file()?,
            1 => self.show_table()?,
            2 => self.add_item()?,
            3 => self.edit_item()?,
            4 => self.delete_item()?,
            5 => self.sort_items()?,
            6 => self.filter_items()?,
            7 => self.save()?,
            8 => self.change_directory()?,
            9 => self.manage_files()?,
            _ => return self.exit(),
        }
        Ok(Flow::Continue)
    }

    fn start(&mut self) -> Result<()> {
        self.say("Wycennik: cost estimates kept in xlsx files.")?;
        self.say("Type 'q' to cancel a prompt; press Enter to accept the value in brackets.")?;

        match self.session.apply_startup() {
            StartupOutcome::NoTarget => self.pick_initial_file(),
            StartupOutcome::Loaded { warnings } => {
                self.report_warnings(&warnings)?;
                self.describe_current_file()
            }
            StartupOutcome::LoadFailed(error) => {
                self.report(&error)?;
                self.say("Starting with an empty estimate.")
            }
            StartupOutcome::Directory => {
                let directory = self.session.current_directory().display().to_string();
                self.say(&format!("Working in {directory}"))
            }
            StartupOutcome::Invalid(path) => {
                let directory = self.session.current_directory().display().to_string();
                self.say(&format!(
                    "'{}' is neither an estimate file nor a folder; working in {directory}",
                    path.display()
                ))
            }
        }
    }

    fn pick_initial_file(&mut self) -> Result<()> {
        let entries = match self.session.list_spreadsheets() {
            Ok(entries) => entries,
            Err(error) => return self.report(&error),
        };
        if entries.is_empty() {
            return self.say("No estimate files here; starting a new estimate.");
        }

        self.say("Estimate files in this folder:")?;
        self.say(&render::file_table(&entries).to_string())?;
        let len = entries.len();
        let picked = self.ask("Pick a file, or press Enter for a new estimate: ", |raw| {
            match prompt::classify(raw) {
                Answer::Empty => Prompt::Value(None),
                _ => prompt::parse_choice(raw, len).map(Some),
            }
        })?;

        match picked.flatten() {
            Some(index) => self.load(&entries[index].path),
            None => self.say("Starting a new estimate."),
        }
    }

    fn open_file(&mut self) -> Result<()> {
        if !self.confirm_discard()? {
            return Ok(());
        }
        let entries = self.session.list_spreadsheets()?;
        if entries.is_empty() {
            return self.say("No estimate files in this folder.");
        }

        self.say(&render::file_table(&entries).to_string())?;
        let len = entries.len();
        let Some(index) = self.ask("File number: ", |raw| prompt::parse_choice(raw, len))? else {
            return Ok(());
        };
        self.load(&entries[index].path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        match self.session.open(path, Discard::Confirmed) {
            Ok(warnings) => {
                self.report_warnings(&warnings)?;
                self.describe_current_file()
            }
            Err(error) => {
                self.report(&error)?;
                self.say("Starting with an empty estimate.")
            }
        }
    }

    fn describe_current_file(&mut self) -> Result<()> {
        let name = self
            .session
            .current_file()
            .map(|file| file.file_name())
            .unwrap_or_default();
        let items = self.session.table().len();
        self.say(&format!("Loaded {name}: {items} item(s)."))
    }

    fn show_table(&mut self) -> Result<()> {
        if self.session.table().is_empty() {
            return self.say("The estimate is empty.");
        }
        let table = self.session.table();
        let rendered = render::item_table(table.items().iter().enumerate()).to_string();
        let total = render::total_line("Total", table.total_cost());
        self.say(&rendered)?;
        self.say(&total)
    }

    fn add_item(&mut self) -> Result<()> {
        let Some(name) = self.ask("Item name: ", prompt::parse_text)? else {
            return Ok(());
        };
        let Some(quantity) = self.ask("Quantity: ", |raw| prompt::parse_amount(raw, None))? else {
            return Ok(());
        };
        let Some(unit) = self.ask_unit(None)? else {
            return Ok(());
        };
        let Some(unit_price) =
            self.ask("Unit price (PLN): ", |raw| prompt::parse_amount(raw, None))?
        else {
            return Ok(());
        };
        let Some(category) = self.ask_category(None)? else {
            return Ok(());
        };
        let Some(description) =
            self.ask("Description (optional): ", |raw| prompt::parse_text_or(raw, ""))?
        else {
            return Ok(());
        };

        let draft = ItemDraft::new(name, quantity, unit, unit_price, category)
            .with_description(description);
        let item = self.session.add_item(draft)?;
        let message = format!(
            "Added '{}', cost {} PLN.",
            item.name(),
            format_amount(item.total())
        );
        self.say(&message)
    }

    fn edit_item(&mut self) -> Result<()> {
        let Some(index) = self.pick_item("Item to edit: ")? else {
            return Ok(());
        };
        let Some(current) = self.session.table().get(index).cloned() else {
            return Err(EstimateError::IndexOutOfRange {
                index,
                len: self.session.table().len(),
            });
        };
        self.say("Press Enter to keep the current value.")?;

        let Some(name) = self.ask(&format!("Item name [{}]: ", current.name()), |raw| {
            prompt::parse_text_or(raw, current.name())
        })?
        else {
            return Ok(());
        };
        let Some(quantity) = self.ask(
            &format!("Quantity [{:.2}]: ", current.quantity()),
            |raw| prompt::parse_amount(raw, Some(current.quantity())),
        )?
        else {
            return Ok(());
        };
        let Some(unit) = self.ask_unit(Some(current.unit()))? else {
            return Ok(());
        };
        let Some(unit_price) = self.ask(
            &format!("Unit price (PLN) [{:.2}]: ", current.unit_price()),
            |raw| prompt::parse_amount(raw, Some(current.unit_price())),
        )?
        else {
            return Ok(());
        };
        let Some(category) = self.ask_category(Some(current.category()))? else {
            return Ok(());
        };
        let Some(description) = self.ask(
            &format!("Description [{}]: ", current.description()),
            |raw| prompt::parse_text_or(raw, current.description()),
        )?
        else {
            return Ok(());
        };

        let changes = ItemChanges {
            name: (name != current.name()).then_some(name),
            quantity: (quantity != current.quantity()).then_some(quantity),
            unit: (unit != current.unit()).then_some(unit),
            unit_price: (unit_price != current.unit_price()).then_some(unit_price),
            category: (category != current.category()).then_some(category),
            description: (description != current.description()).then_some(description),
        };
        if changes.is_empty() {
            return self.say("Nothing changed.");
        }

        let item = self.session.update_item(index, changes)?;
        let message = format!(
            "Updated '{}', cost {} PLN.",
            item.name(),
            format_amount(item.total())
        );
        self.say(&message)
    }

    fn delete_item(&mut self) -> Result<()> {
        let Some(index) = self.pick_item("Item to delete: ")? else {
            return Ok(());
        };
        let name = self
            .session
            .table()
            .get(index)
            .map(|item| item.name().to_string())
            .unwrap_or_default();
        if !self.confirm(&format!("Delete '{name}'? [y/n]: "))? {
            return self.say("Kept.");
        }

        let removed = self.session.remove_item(index)?;
        self.say(&format!("Deleted '{}'.", removed.name()))
    }

    fn sort_items(&mut self) -> Result<()> {
        if self.session.table().is_empty() {
            return self.say("The estimate is empty.");
        }
        let labels: Vec<&str> = SORT_OPTIONS.iter().map(|(label, _, _)| *label).collect();
        self.say_lines(&render::numbered(&labels))?;
        let Some(choice) = self.ask("Sort by: ", |raw| {
            prompt::parse_choice(raw, SORT_OPTIONS.len())
        })?
        else {
            return Ok(());
        };

        let (_, key, direction) = SORT_OPTIONS[choice];
        self.session.sort(key, direction);
        self.show_table()
    }

    fn filter_items(&mut self) -> Result<()> {
        if self.session.table().is_empty() {
            return self.say("The estimate is empty.");
        }
        self.say_lines(&render::numbered(&FILTER_OPTIONS))?;
        let Some(choice) = self.ask("Filter: ", |raw| {
            prompt::parse_choice(raw, FILTER_OPTIONS.len())
        })?
        else {
            return Ok(());
        };

        if choice == 0 {
            self.filter_by_category()
        } else {
            self.filter_by_cost_range()
        }
    }

    fn filter_by_category(&mut self) -> Result<()> {
        let categories: Vec<String> = self
            .session
            .table()
            .categories_in_use()
            .into_iter()
            .collect();
        if categories.is_empty() {
            return self.say("No item has a category.");
        }
        self.say_lines(&render::numbered(&categories))?;
        let len = categories.len();
        let Some(index) = self.ask("Category: ", |raw| prompt::parse_choice(raw, len))? else {
            return Ok(());
        };

        let category = &categories[index];
        let matches = self.session.table().filter_by_category(category);
        let label = format!("Total for '{category}'");
        let rendered = self.render_subset(&matches, &label);
        self.say_lines(&rendered)
    }

    fn filter_by_cost_range(&mut self) -> Result<()> {
        let Some(min) = self.ask("Minimum cost (PLN): ", prompt::parse_bound)? else {
            return Ok(());
        };
        let Some(max) = self.ask("Maximum cost (PLN): ", prompt::parse_bound)? else {
            return Ok(());
        };

        let matches = self.session.table().filter_by_cost_range(min, max)?;
        let label = format!(
            "Total for costs {} - {}",
            format_amount(min),
            format_amount(max)
        );
        let rendered = self.render_subset(&matches, &label);
        self.say_lines(&rendered)
    }

    // Renders filtered items numbered by their position in the stored table.
    fn render_subset(&self, matches: &[&LineItem], label: &str) -> Vec<String> {
        if matches.is_empty() {
            return vec!["No matching items.".to_string()];
        }
        let items = self.session.table().items();
        let rows = matches.iter().filter_map(|item| {
            items
                .iter()
                .position(|candidate| ptr::eq(candidate, *item))
                .map(|index| (index, *item))
        });
        let subtotal: f64 = matches.iter().map(|item| item.total()).sum();
        vec![
            render::item_table(rows).to_string(),
            render::total_line(label, subtotal),
        ]
    }

    fn save(&mut self) -> Result<()> {
        if self.session.table().is_empty() {
            return self.say("Nothing to save: the estimate is empty.");
        }
        let default_name = self.session.default_save_name();
        let Some(name) = self.ask(&format!("File name [{default_name}]: "), |raw| {
            prompt::parse_text_or(raw, &default_name)
        })?
        else {
            return Ok(());
        };
        let directory = self.session.current_directory().display().to_string();
        if !self.confirm(&format!("Save as '{name}' in {directory}? [y/n]: "))? {
            return self.say("Not saved.");
        }

        let artifact = self.session.save(Some(&name))?;
        self.say(&format!(
            "Saved {} (total {} PLN).",
            artifact.path.display(),
            format_amount(artifact.total)
        ))?;
        match &artifact.backup {
            BackupOutcome::Written(path) => self.say(&format!("Backup: {}", path.display())),
            BackupOutcome::Failed { path, reason } => self.say(&format!(
                "Warning: backup {} could not be written: {reason}",
                path.display()
            )),
        }
    }

    fn change_directory(&mut self) -> Result<()> {
        let entries = self.session.list_subdirectories()?;
        let directory = self.session.current_directory().display().to_string();
        self.say(&format!("Current folder: {directory}"))?;
        self.say_lines(&render::numbered(&entries))?;
        let len = entries.len();
        let Some(index) = self.ask("Folder: ", |raw| prompt::parse_choice(raw, len))? else {
            return Ok(());
        };
        if !self.confirm_discard()? {
            return Ok(());
        }

        let directory = self
            .session
            .change_directory(&entries[index], Discard::Confirmed)?
            .display()
            .to_string();
        self.say(&format!("Now in {directory}; starting a new estimate."))
    }

    fn manage_files(&mut self) -> Result<()> {
        self.say_lines(&render::numbered(&FILE_OPTIONS))?;
        let Some(choice) = self.ask("Action: ", |raw| {
            prompt::parse_choice(raw, FILE_OPTIONS.len())
        })?
        else {
            return Ok(());
        };

        match choice {
            0 => self.move_file(),
            1 => self.rename_file(),
            2 => self.delete_file(),
            _ => self.create_directory(),
        }
    }

    fn move_file(&mut self) -> Result<()> {
        let Some(file) = self.pick_file("File to move: ")? else {
            return Ok(());
        };
        let entries = self.session.list_subdirectories()?;
        self.say_lines(&render::numbered(&entries))?;
        let len = entries.len();
        let Some(index) = self.ask("Destination folder: ", |raw| prompt::parse_choice(raw, len))?
        else {
            return Ok(());
        };

        let destination = self.session.current_directory().join(&entries[index]);
        self.relocate(|session, overwrite| session.move_file(&file, &destination, overwrite))
    }

    fn rename_file(&mut self) -> Result<()> {
        let Some(file) = self.pick_file("File to rename: ")? else {
            return Ok(());
        };
        let Some(name) = self.ask("New name: ", prompt::parse_text)? else {
            return Ok(());
        };
        self.relocate(|session, overwrite| session.rename_file(&file, &name, overwrite))
    }

    fn delete_file(&mut self) -> Result<()> {
        let Some(file) = self.pick_file("File to delete: ")? else {
            return Ok(());
        };
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.confirm(&format!("Delete {name} permanently? [y/n]: "))? {
            return self.say("Kept.");
        }
        if self.session.is_current_file(&file)? && !self.confirm_discard()? {
            return self.say("Kept.");
        }

        let deleted = self.session.delete_file(&file, Discard::Confirmed)?;
        self.say(&format!("Deleted {}.", deleted.path.display()))?;
        if deleted.was_open {
            self.say("It was the open estimate; starting a new one.")?;
        }
        Ok(())
    }

    fn create_directory(&mut self) -> Result<()> {
        let Some(name) = self.ask("Folder name: ", prompt::parse_text)? else {
            return Ok(());
        };
        let path = self.session.create_directory(&name)?;
        self.say(&format!("Created {}.", path.display()))
    }

    // Runs a move or rename, asking before an existing file is replaced.
    fn relocate(
        &mut self,
        operation: impl Fn(&mut Session, Overwrite) -> Result<PathBuf>,
    ) -> Result<()> {
        let destination = match operation(&mut self.session, Overwrite::Deny) {
            Err(EstimateError::CollisionDetected(existing)) => {
                let question = format!("{} already exists. Overwrite? [y/n]: ", existing.display());
                if !self.confirm(&question)? {
                    return self.say("Left unchanged.");
                }
                operation(&mut self.session, Overwrite::Allow)?
            }
            other => other?,
        };
        self.say(&format!("Now at {}.", destination.display()))
    }

    fn exit(&mut self) -> Result<Flow> {
        let discard = if self.session.is_modified() {
            if !self.confirm("There are unsaved changes. Exit anyway? [y/n]: ")? {
                return Ok(Flow::Continue);
            }
            Discard::Confirmed
        } else {
            Discard::Unconfirmed
        };
        self.session.request_exit(discard)?;
        self.say("Goodbye.")?;
        Ok(Flow::Exit)
    }

    fn show_menu(&mut self) -> Result<()> {
        let file = self
            .session
            .current_file()
            .map(|file| file.file_name())
            .unwrap_or_else(|| "new estimate".to_string());
        let marker = if self.session.is_modified() {
            " (unsaved changes)"
        } else {
            ""
        };
        self.say("")?;
        self.say(&format!("== {file}{marker} =="))?;
        self.say_lines(&render::numbered(&MENU))
    }

    fn pick_item(&mut self, question: &str) -> Result<Option<usize>> {
        if self.session.table().is_empty() {
            self.say("The estimate is empty.")?;
            return Ok(None);
        }
        self.show_table()?;
        let len = self.session.table().len();
        self.ask(question, |raw| prompt::parse_choice(raw, len))
    }

    fn pick_file(&mut self, question: &str) -> Result<Option<PathBuf>> {
        let entries = self.session.list_spreadsheets()?;
        if entries.is_empty() {
            self.say("No estimate files in this folder.")?;
            return Ok(None);
        }
        self.say(&render::file_table(&entries).to_string())?;
        let len = entries.len();
        let picked = self.ask(question, |raw| prompt::parse_choice(raw, len))?;
        Ok(picked.map(|index| entries[index].path.clone()))
    }

    fn ask_unit(&mut self, current: Option<&str>) -> Result<Option<String>> {
        let units = self.session.settings().units.clone();
        self.say_lines(&render::numbered(&units))?;
        let question = match current {
            Some(current) => format!("Unit (number or text) [{current}]: "),
            None => "Unit (number or text): ".to_string(),
        };
        self.ask(&question, |raw| prompt::parse_pick_or_custom(raw, &units, current))
    }

    fn ask_category(&mut self, current: Option<&str>) -> Result<Option<String>> {
        let categories: Vec<String> = self
            .session
            .table()
            .distinct_categories()
            .names()
            .iter()
            .cloned()
            .collect();
        self.say_lines(&render::numbered(&categories))?;
        let question = match current {
            Some(current) => format!("Category (number or text) [{current}]: "),
            None => "Category (number or text): ".to_string(),
        };
        self.ask(&question, |raw| {
            prompt::parse_pick_or_custom(raw, &categories, current)
        })
    }

    fn confirm_discard(&mut self) -> Result<bool> {
        if !self.session.is_modified() {
            return Ok(true);
        }
        self.confirm("Unsaved changes will be lost. Continue? [y/n]: ")
    }

    /// Yes/no question; cancelling counts as no.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(self
            .ask(question, prompt::parse_confirmation)?
            .unwrap_or(false))
    }

    /// Asks until `parse` accepts the answer. `None` means cancelled.
    fn ask<V>(&mut self, question: &str, parse: impl Fn(&str) -> Prompt<V>) -> Result<Option<V>> {
        loop {
            let Some(raw) = self
                .terminal
                .read_line(question)
                .map_err(EstimateError::Terminal)?
            else {
                return Err(EstimateError::Terminal(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed",
                )));
            };
            match parse(&raw) {
                Prompt::Value(value) => return Ok(Some(value)),
                Prompt::Cancelled => {
                    self.say("Cancelled.")?;
                    return Ok(None);
                }
                Prompt::Invalid(reason) => self.say(&reason)?,
            }
        }
    }

    fn report(&mut self, error: &EstimateError) -> Result<()> {
        debug!(kind = ?error.kind(), %error, "command failed");
        self.say(&format!("Error: {error}"))
    }

    fn report_warnings(&mut self, warnings: &[CellWarning]) -> Result<()> {
        for warning in warnings {
            self.say(&format!("Warning: {warning}"))?;
        }
        Ok(())
    }

    fn say_lines(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            self.say(line)?;
        }
        Ok(())
    }

    fn say(&mut self, text: &str) -> Result<()> {
        self.terminal
            .write_line(text)
            .map_err(EstimateError::Terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::session::terminal::ScriptedTerminal;
    use tempfile::tempdir;

    fn run(root: &Path, answers: &[&str]) -> (Session, ScriptedTerminal) {
        let session = Session::new(Settings::for_root(root));
        let mut shell = Shell::new(session, ScriptedTerminal::new(answers.iter().copied()));
        shell.run().expect("shell finished");
        shell.into_parts()
    }

    #[test]
    fn invalid_answers_are_asked_again() {
        let temp_dir = tempdir().expect("temporary directory");
        let (session, terminal) = run(
            temp_dir.path(),
            &["3", "Cement", "-4", "abc", "10", "5", "12,5", "1", "", "11", "y"],
        );

        assert_eq!(session.table().len(), 1);
        assert_eq!(session.table().items()[0].unit(), "kg");
        assert_eq!(session.table().total_cost(), 125.0);
        assert!(terminal.output().contains("Enter a number between 0 and 1,000,000."));
        assert!(terminal.output().contains("'abc' is not a number."));
    }

    #[test]
    fn cancelling_a_command_returns_to_the_menu() {
        let temp_dir = tempdir().expect("temporary directory");
        let (session, terminal) = run(temp_dir.path(), &["3", "Cement", "q", "11"]);

        assert!(session.table().is_empty());
        assert!(terminal.output().contains("Cancelled."));
        assert!(terminal.output().contains("Goodbye."));
    }

    #[test]
    fn failures_are_reported_and_the_loop_continues() {
        let temp_dir = tempdir().expect("temporary directory");
        let (session, terminal) = run(
            temp_dir.path(),
            &[
                "3", "Cement", "10", "5", "5", "1", "", "7", "2", "500", "100", "11", "y",
            ],
        );

        assert_eq!(session.table().len(), 1);
        assert!(terminal.output().contains("Error: "));
        assert!(terminal.output().contains("Goodbye."));
    }
}
