//! Directory access used by the resolver.
//!
//! The resolver never touches `std::fs` directly; it goes through a
//! [`DirectoryLister`] so tests can describe a source tree in memory, and
//! hierarchical layers go through a pluggable [`HierarchyWalker`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ResolutionError;
use crate::layer::LayerKind;

/// Read-only view of the input filesystem.
pub trait DirectoryLister: Send + Sync {
    /// Returns true if `path` is an existing regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Returns true if `path` is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Regular files directly under `dir`, sorted by name.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Sub-directories directly under `dir`, sorted by name.
    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// [`DirectoryLister`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

impl FsLister {
    fn list(dir: &Path, want_dirs: bool) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            if (want_dirs && path.is_dir()) || (!want_dirs && path.is_file()) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl DirectoryLister for FsLister {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Self::list(dir, false)
    }

    fn list_dirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Self::list(dir, true)
    }
}

/// One input file found inside a named sub-collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionFile {
    /// Name of the sub-collection (directory name).
    pub collection: String,
    /// Path of the matching input file.
    pub path: PathBuf,
}

/// Strategy that enumerates the files of a hierarchical layer.
pub trait HierarchyWalker: Send + Sync {
    /// Returns `(collection, file)` pairs under `root` for inputs of `kind`.
    fn walk(
        &self,
        lister: &dyn DirectoryLister,
        root: &Path,
        kind: LayerKind,
    ) -> Result<Vec<CollectionFile>, ResolutionError>;
}

/// Walks one level of sub-directories and keeps files with an accepted
/// extension. Files lying directly in the root are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubdirectoryWalker;

impl HierarchyWalker for SubdirectoryWalker {
    fn walk(
        &self,
        lister: &dyn DirectoryLister,
        root: &Path,
        kind: LayerKind,
    ) -> Result<Vec<CollectionFile>, ResolutionError> {
        let dirs = lister
            .list_dirs(root)
            .map_err(|e| ResolutionError::listing(root, e))?;

        let mut found = Vec::new();
        for dir in dirs {
            let collection = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let files = lister
                .list_files(&dir)
                .map_err(|e| ResolutionError::listing(&dir, e))?;

            found.extend(
                files
                    .into_iter()
                    .filter(|p| has_accepted_extension(p, kind))
                    .map(|path| CollectionFile {
                        collection: collection.clone(),
                        path,
                    }),
            );
        }
        Ok(found)
    }
}

/// Returns true if `path` has an input extension accepted for `kind`.
pub fn has_accepted_extension(path: &Path, kind: LayerKind) -> bool {
    path.extension()
        .map(|ext| kind.accepts_extension(&ext.to_string_lossy()))
        .unwrap_or(false)
}
