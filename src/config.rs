//! Typed configuration (C15). Overridable concurrency tunables and
//! exclusion lists, loadable from an optional TOML file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub concurrency: ConcurrencyConfig,
    pub exclusions: ExclusionConfig,
    pub pool: PoolConfig,
    pub monitor: MonitorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyConfig::default(),
            exclusions: ExclusionConfig::default(),
            pool: PoolConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub full_index_workers: usize,
    pub change_detection_workers: usize,
    pub subtree_rebuild_workers: usize,
    pub batch_size: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            full_index_workers: 8,
            change_detection_workers: 6,
            subtree_rebuild_workers: 4,
            batch_size: 50_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    pub system_paths: Vec<PathBuf>,
    pub dev_dir_names: Vec<String>,
    pub volume_metadata_names: Vec<String>,
    pub skip_hidden: bool,
    pub skip_dev_extensions: bool,
    pub dev_extensions: Vec<String>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            system_paths: [
                "/dev", "/private", "/System", "/Volumes", "/.fseventsd", "/tmp",
                "/var/folders", "/usr/bin", "/bin", "/sbin", "/Library/Caches",
                "/Library/Logs",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            dev_dir_names: [
                "node_modules", ".git", "build", "target", ".venv", "__pycache__",
                ".cache", ".gradle", "DerivedData", "CMakeFiles",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            volume_metadata_names: [
                ".spotlight-v100",
                ".documentrevisions-v100",
                ".fseventsd",
                ".trashes",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            skip_hidden: false,
            skip_dev_extensions: false,
            dev_extensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub busy_timeout_ms: u64,
    pub read_pool_size: usize,
    pub write_cache_kib: i64,
    pub read_cache_kib: i64,
    pub write_mmap_bytes: i64,
    pub bulk_cache_kib: i64,
    pub bulk_mmap_bytes: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 30_000,
            read_pool_size: 4,
            write_cache_kib: 64 * 1024,
            read_cache_kib: 200 * 1024,
            write_mmap_bytes: 30_i64 * 1024 * 1024 * 1024,
            bulk_cache_kib: 256 * 1024,
            bulk_mmap_bytes: 2_i64 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub batch_size_threshold: usize,
    pub flush_delay_seconds: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size_threshold: 50,
            flush_delay_seconds: 2.0,
        }
    }
}
