//! Project boundary check
//!
//! Scan directories and catalogs picked by the user must live inside the
//! current project (`{show_root}/{project}`); anything else is refused before
//! any file is touched.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Path outside the allowed project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfBoundary {
    pub path: PathBuf,
    pub root: PathBuf,
}

impl fmt::Display for OutOfBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' Out of boundary: not inside project {}",
            self.path.display(),
            self.root.display()
        )
    }
}

impl std::error::Error for OutOfBoundary {}

/// Lexically normalize: drop `.`, fold `..`. Existing paths are canonicalized first.
pub fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Ok when `path` is `root` or below it (component-wise, so `/show/ab` is not inside `/show/a`)
pub fn ensure_within(root: &Path, path: &Path) -> Result<PathBuf, OutOfBoundary> {
    let root_n = normalize(root);
    let path_n = normalize(path);
    if path_n.starts_with(&root_n) {
        Ok(path_n)
    } else {
        Err(OutOfBoundary {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })
    }
}
