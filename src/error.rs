use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::path_guard::PathRejection;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, EstimateError>;

/// Error type covering the failures that can occur while editing, loading,
/// saving, or managing cost estimate files.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// Wrapper for IO failures that could not be classified further.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a quantity or price is negative, not finite, or too large.
    #[error("{field} must be a number between 0 and 1,000,000 (got {value})")]
    OutOfRange { field: &'static str, value: f64 },

    /// Raised when a line item would end up without a name.
    #[error("item name must not be empty")]
    EmptyName,

    /// Raised when an item name equals the summary row marker.
    #[error("'{0}' is reserved for the summary row and can not name an item")]
    ReservedItemName(String),

    /// Raised when a 0-based position does not address an existing item.
    #[error("no item at position {} (table has {len} items)", .index + 1)]
    IndexOutOfRange { index: usize, len: usize },

    /// Raised when the lower bound of a cost range exceeds the upper bound.
    #[error("invalid cost range: {min} is greater than {max}")]
    InvalidRange { min: f64, max: f64 },

    /// Raised when a name or path fails the path-safety rules.
    #[error("unsafe path: {0}")]
    UnsafePath(#[from] PathRejection),

    /// Raised when a file that should exist does not.
    #[error("file not found: {0}")]
    FileMissing(PathBuf),

    /// Raised when a path expected to be a directory is something else.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Raised when a spreadsheet lacks one or more of the estimate columns.
    #[error("spreadsheet is missing columns: {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// Raised when saving an estimate without any line items.
    #[error("the estimate is empty, nothing to save")]
    EmptyTable,

    /// Raised when the filesystem refuses access to a path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Raised when the target device has no space left.
    #[error("no space left on device while writing {0}")]
    DiskFull(PathBuf),

    /// Raised when a destination already exists and overwriting was not confirmed.
    #[error("destination already exists: {0}")]
    CollisionDetected(PathBuf),

    /// Raised when a destructive action needs confirmation to discard unsaved changes.
    #[error("the estimate has unsaved changes")]
    UnsavedChanges,

    /// Raised when the terminal collaborator itself fails.
    #[error("terminal error: {0}")]
    Terminal(io::Error),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

/// Coarse classification of [`EstimateError`] used to decide how a failure is
/// recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad numeric or text input; the user is asked again.
    Validation,
    /// Traversal or illegal name; the operation is aborted.
    PathSafety,
    /// Missing file, directory, or item.
    NotFound,
    /// Destination exists; needs an explicit overwrite confirmation.
    Collision,
    /// Access refused by the filesystem.
    Permission,
    /// Out of disk space.
    DiskFull,
    /// Malformed input spreadsheet.
    Schema,
    /// Everything else coming from the IO layers.
    Io,
}

impl EstimateError {
    /// Returns the recovery class of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EstimateError::OutOfRange { .. }
            | EstimateError::EmptyName
            | EstimateError::ReservedItemName(_)
            | EstimateError::InvalidRange { .. }
            | EstimateError::EmptyTable
            | EstimateError::UnsavedChanges => ErrorKind::Validation,
            EstimateError::UnsafePath(_) | EstimateError::NotADirectory(_) => {
                ErrorKind::PathSafety
            }
            EstimateError::IndexOutOfRange { .. } | EstimateError::FileMissing(_) => {
                ErrorKind::NotFound
            }
            EstimateError::CollisionDetected(_) => ErrorKind::Collision,
            EstimateError::PermissionDenied(_) => ErrorKind::Permission,
            EstimateError::DiskFull(_) => ErrorKind::DiskFull,
            EstimateError::SchemaMismatch { .. } | EstimateError::ExcelRead(_) => {
                ErrorKind::Schema
            }
            EstimateError::Io(_)
            | EstimateError::ExcelWrite(_)
            | EstimateError::Terminal(_)
            | EstimateError::Logging(_) => ErrorKind::Io,
        }
    }

    /// Maps a raw filesystem error for `path` onto the typed variants.
    pub fn from_io(error: io::Error, path: &Path) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                EstimateError::PermissionDenied(path.to_path_buf())
            }
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                EstimateError::DiskFull(path.to_path_buf())
            }
            io::ErrorKind::NotFound => EstimateError::FileMissing(path.to_path_buf()),
            _ => EstimateError::Io(error),
        }
    }
}
