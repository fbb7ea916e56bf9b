//! Tar archive of the working directory, copied into every derived image.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Directory names never copied into the image.
const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules"];

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Builds an in-memory tar archive of `dir`, paths relative to `dir`.
///
/// Symlinks are stored as links, so a dangling one does not fail the archive.
pub fn archive_dir(dir: &Path) -> io::Result<Vec<u8>> {
    let mut tar = tar::Builder::new(Vec::new());
    tar.follow_symlinks(false);

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_excluded(e))
    {
        let entry = entry.map_err(io::Error::other)?;
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);

        if entry.file_type().is_dir() {
            tar.append_dir(relative, path)?;
        } else if entry.file_type().is_file() || entry.path_is_symlink() {
            tar.append_path_with_name(path, relative)?;
        }
    }

    tar.into_inner()
}

/// [`archive_dir`] on the blocking pool.
pub async fn archive(dir: PathBuf) -> io::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || archive_dir(&dir))
        .await
        .map_err(io::Error::other)?
}
