// src/fs/mod.rs

//! Filesystem access for pipeline files and local object trees.
//!
//! The config loader reads the pipeline definition and its SQL files through
//! [`FileSystem`]; [`LocalStorage`] lists objects with [`FileSystem::walk_files`].
//! Tests swap in [`mock::MockFileSystem`].
//!
//! [`LocalStorage`]: crate::external::LocalStorage

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Direct children of `dir`, as full paths.
    fn read_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Every file below `root`, sorted. Subdirectories for which `descend`
    /// returns false are not entered.
    fn walk_files(&self, root: &Path, descend: &dyn Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in self.read_dir(&dir)? {
                if self.is_dir(&entry) {
                    if descend(&entry) {
                        pending.push(entry);
                    }
                } else {
                    files.push(entry);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// `path` below `base` as a `/`-separated key, whatever the platform
/// separator is.
pub fn relative_key(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {path:?}"))
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir(dir)
            .with_context(|| format!("listing directory {dir:?}"))?
            .map(|entry| {
                entry
                    .map(|e| e.path())
                    .with_context(|| format!("reading entry of {dir:?}"))
            })
            .collect()
    }
}
