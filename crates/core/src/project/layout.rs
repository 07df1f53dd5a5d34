use std::fs;
use std::path::{Path, PathBuf};

/// File names tried, in order, for the project config.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["matchcheck.yaml", "matchcheck.yml", "matchcheck.json"];

/// Logical layout of a verification project on disk.
///
/// This is derived from a chosen root path. Apart from `find_config`, it does
/// *not* perform any IO itself.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Root directory of the project.
    pub root: PathBuf,
}

impl ProjectLayout {
    /// Compute the layout for a project rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Resolve a configured path: absolute paths are kept, relative ones are
    /// joined onto the project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// First existing config file under the root, if any.
    pub fn find_config(&self) -> Option<PathBuf> {
        CONFIG_FILE_NAMES.iter().map(|name| self.root.join(name)).find(|p| p.is_file())
    }
}

/// List rebuilt objects in `dir` with the given extension, sorted by file name.
///
/// Only the directory itself is scanned; subdirectories are ignored.
pub fn discover_objects(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            found.push(path);
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}
