//! Directory and archive listing
//!
//! Enumerators return loadable image paths only. The controller applies
//! [`natural_sort`] to whatever they return, so `page2` sorts before `page10`.

use crate::sources::ArchiveExtractor;
use image_cache::{is_image_path, Result};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// How deep to descend into nested folders inside an extracted archive
const MAX_ARCHIVE_DEPTH: usize = 10;

pub trait Enumerator: Send + Sync {
    /// Images directly inside `dir`
    fn list_local_entries(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Images anywhere under an extracted archive's root
    fn list_archive_entries(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Filesystem enumerator with an extension filter
#[derive(Debug, Clone, Copy, Default)]
pub struct FsEnumerator;

impl Enumerator for FsEnumerator {
    fn list_local_entries(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image_path(&path) {
                entries.push(path);
            }
        }
        natural_sort(&mut entries);
        Ok(entries)
    }

    fn list_archive_entries(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        collect_recursive(root, 0, &mut entries)?;
        natural_sort(&mut entries);
        Ok(entries)
    }
}

fn collect_recursive(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if depth < MAX_ARCHIVE_DEPTH {
                collect_recursive(&path, depth + 1, out)?;
            }
        } else if is_image_path(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Numeric-aware ordering of two paths
pub fn natural_cmp(a: &Path, b: &Path) -> Ordering {
    natord::compare(&a.to_string_lossy(), &b.to_string_lossy())
}

pub fn natural_sort(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp(a, b));
}

/// Archives in the same directory as `archive` (including itself), naturally
/// sorted; used to step to the next or previous archive.
pub fn sibling_archives(archive: &Path, extractor: &dyn ArchiveExtractor) -> Result<Vec<PathBuf>> {
    let dir = match archive.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && extractor.is_archive(&path) {
            entries.push(path);
        }
    }
    natural_sort(&mut entries);
    Ok(entries)
}
