//! CLI command implementations.

mod check;
mod precompile;
mod render;

pub use check::{run_check, CheckArgs};
pub use precompile::{run_precompile, PrecompileArgs};
pub use render::{run_render, RenderArgs};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use miette::{miette, Result};
use walkdir::WalkDir;

/// A template file found under a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Name relative to the root, with `/` separators.
    pub name: String,
    pub path: PathBuf,
}

/// Collect the files under `root` whose extension is in `extensions`
/// (all files when `extensions` is empty), sorted by name.
///
/// Hidden files and directories are skipped.
pub fn collect_templates(root: &Path, extensions: &[String]) -> Result<Vec<TemplateFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
    for entry in walker {
        let entry = entry.map_err(|e| miette!("Failed to read {}: {}", root.display(), e))?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(TemplateFile {
            name,
            path: entry.path().to_path_buf(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .map(OsStr::to_string_lossy)
        .is_some_and(|ext| extensions.iter().any(|e| e.trim_start_matches('.') == ext))
}
