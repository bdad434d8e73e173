//! Scanner (C5): enumerate a directory with exclusion policy applied.

use crate::clock::Clock;
use crate::entry::Entry;
use crate::exclude::ExclusionPolicy;
use crate::factory::EntryFactory;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub skip_package_descendants: bool,
    pub skip_hidden: bool,
}

pub struct Scanner<'a> {
    policy: &'a ExclusionPolicy,
    clock: &'a dyn Clock,
    options: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(policy: &'a ExclusionPolicy, clock: &'a dyn Clock, options: ScanOptions) -> Self {
        Self {
            policy,
            clock,
            options,
        }
    }

    /// Non-recursive, files only.
    pub fn scan_root_level_files(&self, root: &Path) -> Vec<Entry> {
        let factory = EntryFactory::new(self.clock);
        let mut out = Vec::new();
        let entries = match fs::read_dir(root) {
            Ok(e) => e,
            Err(err) => {
                warn!(path = %root.display(), error = %err, "scan_root_level_files: unreadable root");
                return out;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Ok(meta) = entry.metadata() else { continue };
            if meta.file_type().is_symlink() || meta.is_dir() {
                continue;
            }
            if self.options.skip_hidden && name.starts_with('.') {
                continue;
            }
            if self.policy.exclude(&path, &name, false) {
                continue;
            }
            if let Some(e) = factory.create(&path, &meta) {
                out.push(e);
            }
        }
        out
    }

    /// Directories minus packages and excluded paths.
    pub fn top_level_directories(&self, root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(root) {
            Ok(e) => e,
            Err(err) => {
                warn!(path = %root.display(), error = %err, "top_level_directories: unreadable root");
                return out;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Ok(meta) = entry.metadata() else { continue };
            if meta.file_type().is_symlink() || !meta.is_dir() {
                continue;
            }
            if self.options.skip_package_descendants && EntryFactory::is_bundle(&path) {
                continue;
            }
            if self.options.skip_hidden && name.starts_with('.') {
                continue;
            }
            if self.policy.exclude(&path, &name, true) {
                continue;
            }
            out.push(path);
        }
        out
    }

    /// Single-threaded recursive scan, used by tests and small subtrees.
    pub fn scan_recursive(&self, dir: &Path) -> Vec<Entry> {
        let factory = EntryFactory::new(self.clock);
        let mut out = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let entries = match fs::read_dir(&current) {
                Ok(e) => e,
                Err(err) => {
                    warn!(path = %current.display(), error = %err, "scan_recursive: unreadable directory, treated as empty");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                let Ok(meta) = entry.metadata() else { continue };
                if meta.file_type().is_symlink() {
                    continue;
                }
                if self.options.skip_hidden && name.starts_with('.') {
                    continue;
                }
                if self.policy.exclude(&path, &name, meta.is_dir()) {
                    continue;
                }
                if meta.is_dir() && EntryFactory::is_bundle(&path) {
                    if let Some(e) = factory.create(&path, &meta) {
                        out.push(e);
                    }
                    continue;
                }
                if meta.is_dir() {
                    if let Some(e) = factory.create(&path, &meta) {
                        out.push(e);
                    }
                    stack.push(path);
                    continue;
                }
                if let Some(e) = factory.create(&path, &meta) {
                    out.push(e);
                }
            }
        }
        out
    }

    /// Prunes unchanged trees by comparing directory mtime to `since`. Any
    /// directory whose own mtime exceeds `since` is reported as-is and not
    /// descended into — the caller is responsible for rebuilding it fully.
    pub fn changed_subtree_roots(&self, dir: &Path, since: f64) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mtime = match fs::metadata(&current).and_then(|m| m.modified()) {
                Ok(t) => t
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0),
                Err(err) => {
                    warn!(path = %current.display(), error = %err, "changed_subtree_roots: stat failed, skipped");
                    continue;
                }
            };
            if mtime > since {
                changed.push(current);
                continue;
            }
            let entries = match fs::read_dir(&current) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(meta) = entry.metadata() else { continue };
                if meta.is_dir() && !meta.file_type().is_symlink() {
                    stack.push(path);
                }
            }
        }
        changed
    }
}
