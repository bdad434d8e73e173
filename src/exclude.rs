//! Exclusion policy (C3): pure decision of whether a path/name/kind is indexed.

use crate::config::ExclusionConfig;
use std::path::Path;

pub struct ExclusionPolicy {
    config: ExclusionConfig,
}

impl ExclusionPolicy {
    pub fn new(config: ExclusionConfig) -> Self {
        Self { config }
    }

    /// Unconditional system paths first, then dev-dir basenames, then
    /// volume metadata, then the opt-in flags. Symlinks are never
    /// consulted here — the scanner skips them upstream.
    pub fn exclude(&self, path: &Path, name: &str, is_directory: bool) -> bool {
        let _ = is_directory;

        if self.matches_system_path(path) {
            return true;
        }

        if self
            .config
            .dev_dir_names
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
        {
            return true;
        }

        let lower = name.to_ascii_lowercase();
        if self
            .config
            .volume_metadata_names
            .iter()
            .any(|v| v.eq_ignore_ascii_case(&lower))
        {
            return true;
        }

        if self.config.skip_hidden && name.starts_with('.') {
            return true;
        }

        if self.config.skip_dev_extensions {
            if let Some(ext) = name.rsplit('.').next() {
                if name.contains('.')
                    && self
                        .config
                        .dev_extensions
                        .iter()
                        .any(|e| e.eq_ignore_ascii_case(ext))
                {
                    return true;
                }
            }
        }

        false
    }

    fn matches_system_path(&self, path: &Path) -> bool {
        self.config
            .system_paths
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}
