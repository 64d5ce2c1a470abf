//! Validation of user supplied file and directory names and containment of
//! resolved paths inside the session root.
//!
//! Every filesystem mutation in the crate goes through [`PathGuard`]: names
//! typed by the user are checked with [`validate_name`], and the resulting
//! path is resolved with [`PathGuard::resolve`] before anything is created,
//! moved, renamed, deleted, or saved.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::error::Result;

/// Extension given to every estimate file.
pub const ESTIMATE_EXTENSION: &str = "xlsx";

const MAX_NAME_LEN: usize = 255;
const ILLEGAL_CHARACTERS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const RESERVED_NAMES: [&str; 4] = ["CON", "PRN", "AUX", "NUL"];
const RESERVED_NUMBERED: [&str; 2] = ["COM", "LPT"];

/// Reason a name or path was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("name is empty")]
    Empty,
    #[error("name is longer than 255 characters")]
    TooLong,
    #[error("name contains a control character")]
    ControlCharacter,
    #[error("name contains the illegal character '{0}'")]
    IllegalCharacter(char),
    #[error("name contains '..'")]
    ParentTraversal,
    #[error("'{0}' is a reserved device name")]
    ReservedName(String),
    #[error("{} is outside of {}", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// What a validated name is going to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    File,
    Directory,
}

/// A single path component that passed [`validate_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedName(String);

impl ValidatedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for ValidatedName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Checks a single file or directory name. File names get the estimate
/// extension appended when it is missing.
pub fn validate_name(
    candidate: &str,
    kind: NameKind,
) -> std::result::Result<ValidatedName, PathRejection> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(PathRejection::Empty);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(PathRejection::ControlCharacter);
    }
    if let Some(illegal) = trimmed.chars().find(|c| ILLEGAL_CHARACTERS.contains(c)) {
        return Err(PathRejection::IllegalCharacter(illegal));
    }
    if trimmed.contains("..") {
        return Err(PathRejection::ParentTraversal);
    }

    let name = match kind {
        NameKind::File => {
            if let Some(reserved) = reserved_base_name(trimmed) {
                return Err(PathRejection::ReservedName(reserved));
            }
            with_extension(trimmed)
        }
        NameKind::Directory => trimmed.to_string(),
    };

    if name.chars().count() > MAX_NAME_LEN {
        return Err(PathRejection::TooLong);
    }
    Ok(ValidatedName(name))
}

fn with_extension(name: &str) -> String {
    let suffix = format!(".{ESTIMATE_EXTENSION}");
    if name.to_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

fn reserved_base_name(name: &str) -> Option<String> {
    let base = name.split('.').next().unwrap_or(name).trim_end();
    let upper = base.to_uppercase();
    if RESERVED_NAMES.contains(&upper.as_str()) {
        return Some(base.to_string());
    }
    let numbered = RESERVED_NUMBERED.iter().any(|prefix| {
        upper.strip_prefix(prefix).is_some_and(|digit| {
            digit.len() == 1 && digit.chars().all(|c| ('1'..='9').contains(&c))
        })
    });
    numbered.then(|| base.to_string())
}

/// Resolved location of an estimate file that is known to lie inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    path: PathBuf,
    directory: PathBuf,
}

impl FileReference {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Final component of the path, used for display and backup naming.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Confines path resolution to a root directory.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Creates a guard for `root`. The root is canonicalized when it exists so
    /// that symlinked ancestors compare correctly.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root
            .canonicalize()
            .unwrap_or_else(|_| normalize(&root).unwrap_or(root));
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` (relative paths are taken relative to the root) and
    /// rejects anything that is not the root or one of its descendants.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        Ok(resolve_within_root(path, &self.root)?)
    }

    /// Resolves `name` inside `directory` as an estimate file.
    pub fn file_in(&self, directory: &Path, name: &str) -> Result<FileReference> {
        let name = validate_name(name, NameKind::File)?;
        let path = self.resolve(&directory.join(&name))?;
        self.reference(path)
    }

    /// Wraps an already resolved path after checking it once more.
    pub fn reference(&self, path: PathBuf) -> Result<FileReference> {
        let path = self.resolve(&path)?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        Ok(FileReference { path, directory })
    }
}

/// Normalizes `path` against `root` and accepts it only if the result is equal
/// to or below `root`.
pub fn resolve_within_root(
    path: &Path,
    root: &Path,
) -> std::result::Result<PathBuf, PathRejection> {
    let outside = || PathRejection::OutsideRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };
    let root = normalize(root).ok_or_else(outside)?;

    let resolved = if path.is_absolute() {
        normalize(path).ok_or_else(outside)?
    } else {
        let mut resolved = root.clone();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if resolved == root || !resolved.pop() {
                        return Err(outside());
                    }
                }
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::Prefix(_) => return Err(outside()),
            }
        }
        resolved
    };

    if !resolved.starts_with(&root) {
        return Err(outside());
    }
    if !existing_ancestor_within(&resolved, &root) {
        return Err(outside());
    }
    Ok(resolved)
}

fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() || normalized.as_os_str().is_empty() {
                    return None;
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Some(normalized)
}

// Symlinks inside the root may point elsewhere; the deepest existing ancestor
// must still canonicalize below the canonical root.
fn existing_ancestor_within(resolved: &Path, root: &Path) -> bool {
    let Ok(canonical_root) = root.canonicalize() else {
        return true;
    };
    resolved
        .ancestors()
        .find(|ancestor| ancestor.exists())
        .and_then(|ancestor| ancestor.canonicalize().ok())
        .is_none_or(|ancestor| ancestor.starts_with(&canonical_root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_extension_to_file_names() {
        let name = validate_name("kosztorys", NameKind::File).expect("valid name");
        assert_eq!(name.as_str(), "kosztorys.xlsx");

        let name = validate_name("Remont.XLSX", NameKind::File).expect("valid name");
        assert_eq!(name.as_str(), "Remont.XLSX");

        let name = validate_name("faktury", NameKind::Directory).expect("valid name");
        assert_eq!(name.as_str(), "faktury");
    }

    #[test]
    fn rejects_illegal_names() {
        assert_eq!(validate_name("  ", NameKind::File), Err(PathRejection::Empty));
        assert_eq!(
            validate_name("a/b", NameKind::File),
            Err(PathRejection::IllegalCharacter('/'))
        );
        assert_eq!(
            validate_name("what?", NameKind::Directory),
            Err(PathRejection::IllegalCharacter('?'))
        );
        assert_eq!(
            validate_name("tab\there", NameKind::File),
            Err(PathRejection::ControlCharacter)
        );
        assert_eq!(
            validate_name("x..y", NameKind::File),
            Err(PathRejection::ParentTraversal)
        );
        assert_eq!(
            validate_name(&"a".repeat(256), NameKind::Directory),
            Err(PathRejection::TooLong)
        );
        assert_eq!(
            validate_name(&"a".repeat(251), NameKind::File),
            Err(PathRejection::TooLong)
        );
    }

    #[test]
    fn rejects_reserved_device_names_with_any_extension() {
        for candidate in ["CON", "con", "CON.xlsx", "Con.txt", "nul", "COM1", "lpt9.xlsx"] {
            assert!(
                matches!(
                    validate_name(candidate, NameKind::File),
                    Err(PathRejection::ReservedName(_))
                ),
                "{candidate} should be reserved"
            );
        }
        assert!(validate_name("COM10", NameKind::File).is_ok());
        assert!(validate_name("console", NameKind::File).is_ok());
        assert!(validate_name("CON", NameKind::Directory).is_ok());
    }

    #[test]
    fn parent_traversal_never_escapes_the_root() {
        for root in ["/", "/srv/estimates", "/srv/estimates/deep/tree"] {
            let result = resolve_within_root(Path::new("../../etc/passwd"), Path::new(root));
            assert!(
                matches!(result, Err(PathRejection::OutsideRoot { .. })),
                "escaped from {root}"
            );
        }
    }

    #[test]
    fn resolves_descendants_and_the_root_itself() {
        let root = Path::new("/srv/estimates");
        assert_eq!(
            resolve_within_root(Path::new("a/./b/../c.xlsx"), root),
            Ok(PathBuf::from("/srv/estimates/a/c.xlsx"))
        );
        assert_eq!(
            resolve_within_root(Path::new("/srv/estimates/x/.."), root),
            Ok(PathBuf::from("/srv/estimates"))
        );
        assert!(resolve_within_root(Path::new("/srv/other/x.xlsx"), root).is_err());
        assert!(resolve_within_root(Path::new("/srv/estimates-old/x.xlsx"), root).is_err());
    }
}
