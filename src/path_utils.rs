// Path normalization utilities for cross-platform manifest portability
// Manifest keys always use forward slashes regardless of host platform

use std::path::{Component, Path, PathBuf};

/// Encode a root-relative path into its portable manifest form.
///
/// Joins the normal components with `/` so a manifest written on Windows
/// reads identically on Unix and vice versa.
pub fn to_portable(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

/// Normalize a manifest path string read from disk.
///
/// Older manifests written by other tools may carry backslashes; both
/// separators map to the canonical `/` form used as the map key.
pub fn normalize_portable(path_str: &str) -> String {
    path_str.replace('\\', "/")
}

/// Resolve a portable manifest path against an archive root
pub fn to_filesystem(portable: &str, root: &Path) -> PathBuf {
    let mut out = root.to_path_buf();
    for part in portable.split('/').filter(|p| !p.is_empty()) {
        out.push(part);
    }
    out
}

/// Make a path absolute and canonical without requiring it to exist.
///
/// A path that does not exist yet is resolved through its parent directory,
/// so comparisons against canonicalized walk output still match.
pub fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(canonical_parent) = parent.canonicalize() {
            return canonical_parent.join(name);
        }
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
