//! Listing and management of estimate files inside the session root.
//!
//! Every operation resolves its targets through [`PathGuard`] and checks
//! permissions up front, before the filesystem is touched.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, instrument};

use crate::error::{EstimateError, Result};
use crate::path_guard::{ESTIMATE_EXTENSION, NameKind, PathGuard, validate_name};

/// Entry prepended to directory listings to navigate one level up.
pub const PARENT_ENTRY: &str = "..";

/// An estimate file found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Whether an existing destination may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Deny,
    Allow,
}

/// Result of [`FileManager::delete_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub path: PathBuf,
    /// The deleted file was the one open in the session, which must now be
    /// reset.
    pub was_open: bool,
}

#[derive(Debug, Clone)]
pub struct FileManager {
    guard: PathGuard,
}

impl FileManager {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// Estimate files in `directory`, most recently modified first.
    pub fn list_spreadsheets(&self, directory: &Path) -> Result<Vec<FileEntry>> {
        let directory = self.existing_directory(directory)?;
        let mut entries = Vec::new();

        let listing =
            fs::read_dir(&directory).map_err(|err| EstimateError::from_io(err, &directory))?;
        for entry in listing {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if name.starts_with('.') || !has_estimate_extension(&path) {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(FileEntry {
                name,
                path,
                modified: metadata.modified()?,
                size: metadata.len(),
            });
        }

        entries.sort_by(|lhs, rhs| {
            rhs.modified
                .cmp(&lhs.modified)
                .then_with(|| lhs.name.cmp(&rhs.name))
        });
        Ok(entries)
    }

    /// Names of the visible subdirectories of `directory`, sorted, preceded
    /// by [`PARENT_ENTRY`].
    pub fn list_subdirectories(&self, directory: &Path) -> Result<Vec<String>> {
        let directory = self.existing_directory(directory)?;
        let mut names = Vec::new();

        let listing =
            fs::read_dir(&directory).map_err(|err| EstimateError::from_io(err, &directory))?;
        for entry in listing {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.file_type()?.is_dir() {
                names.push(name);
            }
        }

        names.sort();
        names.insert(0, PARENT_ENTRY.to_string());
        Ok(names)
    }

    /// Moves `file` into `destination_directory`, keeping its name.
    #[instrument(
        level = "info",
        skip_all,
        fields(file = %file.display(), to = %destination_directory.display())
    )]
    pub fn move_file(
        &self,
        file: &Path,
        destination_directory: &Path,
        overwrite: Overwrite,
    ) -> Result<PathBuf> {
        let source = self.existing_file(file)?;
        let directory = self.existing_directory(destination_directory)?;
        let file_name = source
            .file_name()
            .ok_or_else(|| EstimateError::FileMissing(source.clone()))?;
        let destination = self.guard.resolve(&directory.join(file_name))?;
        self.relocate(&source, &destination, overwrite)
    }

    /// Renames `file` within its directory. The new name is validated as an
    /// estimate file name and gets the extension when it lacks one.
    #[instrument(level = "info", skip_all, fields(file = %file.display(), new_name = %new_name))]
    pub fn rename_file(
        &self,
        file: &Path,
        new_name: &str,
        overwrite: Overwrite,
    ) -> Result<PathBuf> {
        let source = self.existing_file(file)?;
        let name = validate_name(new_name, NameKind::File)?;
        let directory = source.parent().unwrap_or(self.guard.root());
        let destination = self.guard.resolve(&directory.join(&name))?;
        self.relocate(&source, &destination, overwrite)
    }

    /// Deletes `file`. `open_file` is the file currently loaded in the
    /// session, used to tell the caller whether it has to reset.
    #[instrument(level = "info", skip_all, fields(file = %file.display()))]
    pub fn delete_file(&self, file: &Path, open_file: Option<&Path>) -> Result<Deleted> {
        let source = self.existing_file(file)?;
        ensure_writable_directory(parent_of(&source))?;
        ensure_writable_file(&source)?;

        let was_open = open_file.is_some_and(|open| same_file(open, &source));
        fs::remove_file(&source).map_err(|err| EstimateError::from_io(err, &source))?;
        info!(was_open, "file deleted");
        Ok(Deleted {
            path: source,
            was_open,
        })
    }

    /// Creates the directory `name` inside `parent`.
    #[instrument(level = "info", skip_all, fields(parent = %parent.display(), name = %name))]
    pub fn create_directory(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        let parent = self.existing_directory(parent)?;
        let name = validate_name(name, NameKind::Directory)?;
        let path = self.guard.resolve(&parent.join(&name))?;
        if path.exists() {
            return Err(EstimateError::CollisionDetected(path));
        }
        ensure_writable_directory(&parent)?;
        fs::create_dir(&path).map_err(|err| EstimateError::from_io(err, &path))?;
        info!(path = %path.display(), "directory created");
        Ok(path)
    }

    fn relocate(
        &self,
        source: &Path,
        destination: &Path,
        overwrite: Overwrite,
    ) -> Result<PathBuf> {
        if source == destination {
            return Ok(destination.to_path_buf());
        }

        ensure_readable(source)?;
        ensure_writable_directory(parent_of(source))?;
        ensure_writable_directory(parent_of(destination))?;

        if destination.is_dir() {
            return Err(EstimateError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a directory", destination.display()),
            )));
        }
        if destination.exists() {
            if overwrite == Overwrite::Deny {
                return Err(EstimateError::CollisionDetected(destination.to_path_buf()));
            }
            ensure_writable_file(destination)?;
        }

        match fs::rename(source, destination) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                fs::copy(source, destination)
                    .map_err(|err| EstimateError::from_io(err, destination))?;
                fs::remove_file(source).map_err(|err| EstimateError::from_io(err, source))?;
            }
            Err(err) => return Err(EstimateError::from_io(err, destination)),
        }
        info!(from = %source.display(), to = %destination.display(), "file relocated");
        Ok(destination.to_path_buf())
    }

    fn existing_file(&self, file: &Path) -> Result<PathBuf> {
        let path = self.guard.resolve(file)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(EstimateError::FileMissing(path))
        }
    }

    fn existing_directory(&self, directory: &Path) -> Result<PathBuf> {
        let path = self.guard.resolve(directory)?;
        if path.is_dir() {
            Ok(path)
        } else if path.exists() {
            Err(EstimateError::NotADirectory(path))
        } else {
            Err(EstimateError::FileMissing(path))
        }
    }
}

fn has_estimate_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ESTIMATE_EXTENSION))
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}

fn same_file(lhs: &Path, rhs: &Path) -> bool {
    match (lhs.canonicalize(), rhs.canonicalize()) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => lhs == rhs,
    }
}

fn ensure_readable(path: &Path) -> Result<()> {
    File::open(path)
        .map(drop)
        .map_err(|err| EstimateError::from_io(err, path))
}

/// Refuses directories whose permission bits carry no write access at all.
///
/// This looks at the mode bits only, not at the effective user, ACLs or a
/// read-only mount. Anything it lets through still fails at the filesystem
/// call and is mapped by [`EstimateError::from_io`].
fn ensure_writable_directory(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|err| EstimateError::from_io(err, path))?;
    if metadata.permissions().readonly() {
        return Err(EstimateError::PermissionDenied(path.to_path_buf()));
    }
    Ok(())
}

/// Same coarse check as [`ensure_writable_directory`], for an existing file.
fn ensure_writable_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.permissions().readonly() => {
            Err(EstimateError::PermissionDenied(path.to_path_buf()))
        }
        Ok(_) => Ok(()),
        Err(err) => Err(EstimateError::from_io(err, path)),
    }
}
