//! Entry factory (C4): derive an `Entry` from a filesystem item, including
//! bundle-size rollup.

use crate::clock::Clock;
use crate::entry::Entry;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Bundle/package suffixes treated as opaque file-like units.
pub const BUNDLE_EXTENSIONS: &[&str] = &[
    "app", "bundle", "framework", "kext", "plugin", "photoslibrary", "pages", "key", "numbers",
];

pub struct EntryFactory<'c> {
    clock: &'c dyn Clock,
}

impl<'c> EntryFactory<'c> {
    pub fn new(clock: &'c dyn Clock) -> Self {
        Self { clock }
    }

    pub fn is_bundle(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| BUNDLE_EXTENSIONS.iter().any(|b| b.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Build an `Entry` for `path` given its already-resolved symlink metadata.
    /// Returns `None` only if the path itself is a symlink the caller should
    /// have filtered already.
    pub fn create(&self, path: &Path, metadata: &fs::Metadata) -> Option<Entry> {
        if metadata.file_type().is_symlink() {
            return None;
        }

        let name = path.file_name()?.to_string_lossy().into_owned();
        let full_path = path.to_string_lossy().into_owned();
        let date_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_else(|| self.clock.now());

        if metadata.is_dir() && Self::is_bundle(path) {
            let size = Some(bundle_rollup_size(path));
            let file_extension = extension_for(path);
            return Some(Entry {
                name,
                full_path,
                is_directory: true,
                file_extension,
                size,
                date_modified,
                date_added: self.clock.now(),
            });
        }

        if metadata.is_dir() {
            return Some(Entry {
                name,
                full_path,
                is_directory: true,
                file_extension: None,
                size: None,
                date_modified,
                date_added: self.clock.now(),
            });
        }

        let size = Some(resolve_file_size(metadata, path));
        Some(Entry {
            name,
            full_path,
            is_directory: false,
            file_extension: extension_for(path),
            size,
            date_modified,
            date_added: self.clock.now(),
        })
    }
}

/// Precedence: 2) attribute-reported size, 3) re-stat, else None (collapsed
/// to 0 here since `metadata` was already obtained successfully).
fn resolve_file_size(metadata: &fs::Metadata, path: &Path) -> i64 {
    let len = metadata.len();
    if len > 0 {
        return len as i64;
    }
    fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0)
}

fn extension_for(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Recursive sum of non-directory descendants' sizes. An enumeration error
/// on a child is logged and skipped rather than aborting the rollup.
fn bundle_rollup_size(root: &Path) -> i64 {
    let mut total: i64 = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "bundle rollup: unreadable directory skipped");
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "bundle rollup: direntry read failed, skipped");
                    continue;
                }
            };
            let path = entry.path();
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "bundle rollup: stat failed, skipped");
                    continue;
                }
            };
            if meta.is_dir() {
                stack.push(path);
            } else if !meta.file_type().is_symlink() {
                total += meta.len() as i64;
            }
        }
    }
    total
}
