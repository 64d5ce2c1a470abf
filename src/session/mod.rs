//! Session context tying the table, the current file, and the filesystem
//! together.
//!
//! [`Session`] owns all mutable state and performs the operations; it never
//! talks to the user. [`Shell`](shell::Shell) drives a session from a
//! [`Terminal`](terminal::Terminal).

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{Settings, StartupTarget};
use crate::error::{EstimateError, Result};
use crate::files::{Deleted, FileEntry, FileManager, Overwrite, PARENT_ENTRY};
use crate::io::{self, CellWarning, SavedArtifact};
use crate::model::{EstimateTable, ItemChanges, ItemDraft, LineItem, SortDirection, SortKey};
use crate::path_guard::{FileReference, NameKind, PathGuard, validate_name};

pub mod prompt;
mod render;
pub mod shell;
pub mod terminal;

pub use prompt::Prompt;
pub use shell::Shell;
pub use terminal::{ScriptedTerminal, StdTerminal, Terminal};

/// Where the session is in its edit/save cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing loaded; an empty, unsaved estimate.
    Idle,
    /// A file was loaded and not changed since.
    FileSelected,
    /// The table has changes that are not saved.
    Mutated,
    /// The table was saved and not changed since.
    Saved,
}

/// Whether the user agreed to throw away unsaved changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    Unconfirmed,
    Confirmed,
}

/// What happened with the startup argument.
#[derive(Debug)]
pub enum StartupOutcome {
    /// No argument; a file should be picked interactively.
    NoTarget,
    /// The file was loaded.
    Loaded { warnings: Vec<CellWarning> },
    /// The file could not be loaded; the session starts empty.
    LoadFailed(EstimateError),
    /// The session starts in the given directory.
    Directory,
    /// The argument was neither an estimate file nor a directory.
    Invalid(PathBuf),
}

#[derive(Debug)]
pub struct Session {
    settings: Settings,
    files: FileManager,
    table: EstimateTable,
    current_directory: PathBuf,
    current_file: Option<FileReference>,
    state: SessionState,
}

impl Session {
    /// Creates an idle session in the root directory.
    pub fn new(settings: Settings) -> Self {
        let guard = PathGuard::new(settings.root.clone());
        let current_directory = guard.root().to_path_buf();
        Self {
            settings,
            files: FileManager::new(guard),
            table: EstimateTable::new(),
            current_directory,
            current_file: None,
            state: SessionState::Idle,
        }
    }

    /// Acts on the startup argument recorded in the settings.
    pub fn apply_startup(&mut self) -> StartupOutcome {
        match self.settings.startup.clone() {
            StartupTarget::None => StartupOutcome::NoTarget,
            StartupTarget::File(path) => match self.open(&path, Discard::Unconfirmed) {
                Ok(warnings) => StartupOutcome::Loaded { warnings },
                Err(error) => StartupOutcome::LoadFailed(error),
            },
            StartupTarget::Directory(path) => match self.guard().resolve(&path) {
                Ok(directory) => {
                    self.current_directory = directory;
                    StartupOutcome::Directory
                }
                Err(_) => StartupOutcome::Invalid(path),
            },
            StartupTarget::Invalid(path) => StartupOutcome::Invalid(path),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn guard(&self) -> &PathGuard {
        self.files.guard()
    }

    pub fn table(&self) -> &EstimateTable {
        &self.table
    }

    pub fn current_directory(&self) -> &Path {
        &self.current_directory
    }

    pub fn current_file(&self) -> Option<&FileReference> {
        self.current_file.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_modified(&self) -> bool {
        self.state == SessionState::Mutated
    }

    /// Fails with [`EstimateError::UnsavedChanges`] when unsaved changes would
    /// be lost without confirmation.
    pub fn ensure_discardable(&self, discard: Discard) -> Result<()> {
        if self.is_modified() && discard == Discard::Unconfirmed {
            Err(EstimateError::UnsavedChanges)
        } else {
            Ok(())
        }
    }

    /// Estimate files in the current directory, newest first.
    pub fn list_spreadsheets(&self) -> Result<Vec<FileEntry>> {
        self.files.list_spreadsheets(&self.current_directory)
    }

    /// Subdirectories of the current directory, preceded by the parent entry.
    pub fn list_subdirectories(&self) -> Result<Vec<String>> {
        self.files.list_subdirectories(&self.current_directory)
    }

    /// Loads `path` as the current estimate. A failed load leaves the session
    /// with an empty, idle table.
    pub fn open(&mut self, path: &Path, discard: Discard) -> Result<Vec<CellWarning>> {
        self.ensure_discardable(discard)?;
        let reference = self.guard().reference(path.to_path_buf())?;

        match io::load(reference.path()) {
            Ok(loaded) => {
                self.table = loaded.table;
                self.current_directory = reference.directory().to_path_buf();
                self.current_file = Some(reference);
                self.state = SessionState::FileSelected;
                Ok(loaded.warnings)
            }
            Err(error) => {
                self.reset();
                Err(error)
            }
        }
    }

    /// Starts a new, empty estimate in the current directory.
    pub fn new_estimate(&mut self, discard: Discard) -> Result<()> {
        self.ensure_discardable(discard)?;
        self.reset();
        Ok(())
    }

    pub fn add_item(&mut self, draft: ItemDraft) -> Result<&LineItem> {
        let item = self.table.add(draft)?;
        self.state = SessionState::Mutated;
        Ok(item)
    }

    pub fn update_item(&mut self, index: usize, changes: ItemChanges) -> Result<&LineItem> {
        let item = self.table.update(index, changes)?;
        self.state = SessionState::Mutated;
        Ok(item)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<LineItem> {
        let removed = self.table.remove(index)?;
        self.state = SessionState::Mutated;
        Ok(removed)
    }

    /// Sorts the stored table; the new order is what gets saved.
    pub fn sort(&mut self, key: SortKey, direction: SortDirection) {
        if self.table.is_empty() {
            return;
        }
        self.table.sort(key, direction);
        self.state = SessionState::Mutated;
    }

    /// Name offered when saving: the open file, or the configured default.
    pub fn default_save_name(&self) -> String {
        self.current_file
            .as_ref()
            .map(FileReference::file_name)
            .unwrap_or_else(|| self.settings.default_file_name.clone())
    }

    /// Saves the table as `name` (or [`Self::default_save_name`]) in the
    /// current directory. The modified flag is cleared only on success.
    pub fn save(&mut self, name: Option<&str>) -> Result<SavedArtifact> {
        if self.table.is_empty() {
            return Err(EstimateError::EmptyTable);
        }
        let name = name.map_or_else(|| self.default_save_name(), str::to_string);
        let reference = self.guard().file_in(&self.current_directory, &name)?;

        let artifact = io::save(&self.table, &reference)?;
        self.current_file = Some(reference);
        self.state = SessionState::Saved;
        Ok(artifact)
    }

    /// Enters the subdirectory `entry` of the current directory, or its
    /// parent for [`PARENT_ENTRY`]. The table is discarded.
    pub fn change_directory(&mut self, entry: &str, discard: Discard) -> Result<&Path> {
        self.ensure_discardable(discard)?;
        let target = if entry == PARENT_ENTRY {
            self.current_directory.join(PARENT_ENTRY)
        } else {
            let name = validate_name(entry, NameKind::Directory)?;
            self.current_directory.join(name)
        };

        let directory = self.guard().resolve(&target)?;
        if !directory.is_dir() {
            return Err(EstimateError::NotADirectory(directory));
        }
        info!(directory = %directory.display(), "directory changed");
        self.current_directory = directory;
        self.reset();
        Ok(self.current_directory.as_path())
    }

    pub fn move_file(
        &mut self,
        file: &Path,
        destination_directory: &Path,
        overwrite: Overwrite,
    ) -> Result<PathBuf> {
        let destination = self
            .files
            .move_file(file, destination_directory, overwrite)?;
        self.follow_relocation(file, &destination)?;
        Ok(destination)
    }

    pub fn rename_file(
        &mut self,
        file: &Path,
        new_name: &str,
        overwrite: Overwrite,
    ) -> Result<PathBuf> {
        let destination = self.files.rename_file(file, new_name, overwrite)?;
        self.follow_relocation(file, &destination)?;
        Ok(destination)
    }

    /// Deletes `file`; deleting the open file resets the session.
    pub fn delete_file(&mut self, file: &Path, discard: Discard) -> Result<Deleted> {
        if self.is_current_file(file)? {
            self.ensure_discardable(discard)?;
        }
        let open = self.current_file.as_ref().map(FileReference::path);
        let deleted = self.files.delete_file(file, open)?;
        if deleted.was_open {
            self.reset();
        }
        Ok(deleted)
    }

    /// Creates a subdirectory of the current directory.
    pub fn create_directory(&self, name: &str) -> Result<PathBuf> {
        self.files.create_directory(&self.current_directory, name)
    }

    /// Checks whether the session may end.
    pub fn request_exit(&self, discard: Discard) -> Result<()> {
        self.ensure_discardable(discard)
    }

    /// Whether `path` resolves to the file the table was loaded from or saved to.
    pub fn is_current_file(&self, path: &Path) -> Result<bool> {
        let path = self.guard().resolve(path)?;
        Ok(self
            .current_file
            .as_ref()
            .is_some_and(|current| current.path() == path))
    }

    fn follow_relocation(&mut self, from: &Path, to: &Path) -> Result<()> {
        if self.is_current_file(from)? {
            debug!(to = %to.display(), "open file relocated");
            self.current_file = Some(self.guard().reference(to.to_path_buf())?);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.table = EstimateTable::new();
        self.current_file = None;
        self.state = SessionState::Idle;
    }
}
