use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::path_guard::ESTIMATE_EXTENSION;

/// File name proposed when saving an estimate that has never been saved.
pub const DEFAULT_FILE_NAME: &str = "wycennik.xlsx";

/// Units offered by number when entering an item.
pub const DEFAULT_UNITS: [&str; 9] = ["szt", "m²", "godz", "m³", "kg", "l", "m", "t", "kWh"];

/// What the startup argument pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupTarget {
    /// Nothing given; pick a file interactively.
    None,
    /// An existing estimate file.
    File(PathBuf),
    /// An existing directory.
    Directory(PathBuf),
    /// Something that is neither; reported and ignored.
    Invalid(PathBuf),
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory tree the session may not leave.
    pub root: PathBuf,
    pub startup: StartupTarget,
    pub default_file_name: String,
    pub units: Vec<String>,
}

impl Settings {
    /// Builds the settings from the command line values. `working_dir` is the
    /// process working directory, used for relative paths and as the fallback
    /// root.
    pub fn resolve(path: Option<&Path>, root: Option<&Path>, working_dir: &Path) -> Result<Self> {
        let startup = match path {
            None => StartupTarget::None,
            Some(path) => classify(&absolute(path, working_dir)),
        };

        let root = match (root, &startup) {
            (Some(root), _) => absolute(root, working_dir),
            (None, StartupTarget::Directory(dir)) => dir.clone(),
            (None, StartupTarget::File(file)) => file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| working_dir.to_path_buf()),
            (None, _) => working_dir.to_path_buf(),
        };
        let root = root.canonicalize()?;

        Ok(Self {
            root,
            startup,
            default_file_name: DEFAULT_FILE_NAME.to_string(),
            units: DEFAULT_UNITS.iter().map(|unit| unit.to_string()).collect(),
        })
    }

    /// Settings rooted at `root` with no startup target.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            startup: StartupTarget::None,
            default_file_name: DEFAULT_FILE_NAME.to_string(),
            units: DEFAULT_UNITS.iter().map(|unit| unit.to_string()).collect(),
        }
    }
}

fn absolute(path: &Path, working_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn classify(path: &Path) -> StartupTarget {
    let is_estimate = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ESTIMATE_EXTENSION));
    if path.is_file() && is_estimate {
        StartupTarget::File(path.to_path_buf())
    } else if path.is_dir() {
        StartupTarget::Directory(path.to_path_buf())
    } else {
        StartupTarget::Invalid(path.to_path_buf())
    }
}
