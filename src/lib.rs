//! Application root (C17): wires the store, exclusion policy, indexer,
//! change monitor, and search service into one handle.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod exclude;
pub mod factory;
pub mod indexer;
pub mod monitor;
pub mod pool;
pub mod query;
pub mod scanner;
pub mod search;
pub mod workqueue;

use clock::{Clock, SystemClock};
use config::Config;
use entry::IndexingMetadata;
use error::SeekError;
use exclude::ExclusionPolicy;
use indexer::{IndexProgress, Indexer, IndexingStatistics, ProgressCallback};
use monitor::{ChangeMonitor, EventSource, MonitorState};
use pool::Pool;
use search::{SearchResult, SearchService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[cfg(target_os = "macos")]
fn default_event_source() -> Arc<dyn EventSource> {
    Arc::new(monitor::macos::FsEventSource::new())
}

#[cfg(not(target_os = "macos"))]
fn default_event_source() -> Arc<dyn EventSource> {
    Arc::new(monitor::generic::NotifyEventSource::new())
}

/// Resolves the default on-disk location for the index database:
/// `<app-local-data-dir>/seek/file_index.db`.
pub fn default_store_path() -> Result<PathBuf, SeekError> {
    let base = dirs::data_local_dir().ok_or_else(|| {
        SeekError::Store(error::StoreError::ConnectionFailed(
            "could not resolve a local data directory for this platform".to_string(),
        ))
    })?;
    Ok(base.join("seek").join("file_index.db"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub total_files: i64,
    pub index_size_bytes: u64,
}

pub struct SeekApp {
    db_path: PathBuf,
    pool: Arc<Pool>,
    policy: Arc<ExclusionPolicy>,
    clock: Arc<dyn Clock>,
    indexer: Indexer,
    monitor: ChangeMonitor,
    search: SearchService,
}

impl SeekApp {
    /// Opens (creating if absent) the store at `db_path` and wires the
    /// monitor, indexer and search service on top of it, in that order.
    pub fn open(db_path: &Path, config: Config) -> Result<Self, SeekError> {
        let pool = Arc::new(Pool::open(db_path, config.pool.clone())?);
        let policy = Arc::new(ExclusionPolicy::new(config.exclusions.clone()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let source = default_event_source();
        let monitor = ChangeMonitor::new(
            Arc::clone(&pool),
            Arc::clone(&policy),
            Arc::clone(&clock),
            source,
            config.monitor.batch_size_threshold,
            config.monitor.flush_delay_seconds,
        );

        let indexer = Indexer::new(
            Arc::clone(&pool),
            Arc::clone(&policy),
            Arc::clone(&clock),
            config.concurrency.clone(),
        );

        let search = SearchService::new(Arc::clone(&pool), Arc::clone(&clock));

        info!(path = %db_path.display(), "seek index opened");
        Ok(Self {
            db_path: db_path.to_path_buf(),
            pool,
            policy,
            clock,
            indexer,
            monitor,
            search,
        })
    }

    /// Opens the index at the platform default location.
    pub fn open_default(config: Config) -> Result<Self, SeekError> {
        Self::open(&default_store_path()?, config)
    }

    pub fn search(&self, query: &str, limit: Option<i64>) -> Result<SearchResult, SeekError> {
        self.search.search(query, limit)
    }

    pub fn is_indexed(&self) -> Result<bool, SeekError> {
        Ok(self.pool.read(entry::read_metadata)?.is_indexed)
    }

    pub fn indexing_status(&self) -> Result<IndexingMetadata, SeekError> {
        self.pool.read(entry::read_metadata)
    }

    /// Full reindex, or a no-op if the stored event cursor is still valid
    /// for `roots` (the monitor is expected to already be live in that case).
    pub fn perform_smart_indexing(
        &self,
        roots: Vec<PathBuf>,
        progress: ProgressCallback,
    ) -> Result<IndexingStatistics, SeekError> {
        self.indexer.perform_smart_indexing(&roots, &self.monitor, progress)
    }

    pub fn perform_full_indexing(
        &self,
        roots: Vec<PathBuf>,
        progress: ProgressCallback,
    ) -> Result<IndexingStatistics, SeekError> {
        self.indexer.perform_full_indexing(&roots, progress)
    }

    pub fn start_monitoring_with_recovery(&self, roots: Vec<PathBuf>) -> Result<(), SeekError> {
        self.monitor.start_monitoring_with_recovery(roots)
    }

    pub fn stop_monitoring(&self) {
        self.monitor.stop_monitoring();
    }

    pub fn monitoring_status(&self) -> MonitorState {
        self.monitor.state()
    }

    pub fn file_count(&self) -> Result<i64, SeekError> {
        self.pool.read(entry::count_entries)
    }

    pub fn search_stats(&self) -> Result<SearchStats, SeekError> {
        let total_files = self.pool.read(entry::count_entries)?;
        let index_size_bytes = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);
        Ok(SearchStats {
            total_files,
            index_size_bytes,
        })
    }

    pub fn exclusion_policy(&self) -> &ExclusionPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

pub fn default_progress_callback() -> ProgressCallback {
    Arc::new(|p: IndexProgress| {
        info!(fraction = p.fraction, processed = p.processed, total = p.total, message = ?p.message, "indexing progress");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_empty_store_that_is_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let app = SeekApp::open(&dir.path().join("seek/file_index.db"), Config::default()).unwrap();
        assert!(!app.is_indexed().unwrap());
        assert_eq!(app.file_count().unwrap(), 0);
    }

    #[test]
    fn full_index_then_search_round_trips() {
        let source_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("readme.md"), "hello").unwrap();

        let store_dir = tempfile::tempdir().unwrap();
        let app = SeekApp::open(&store_dir.path().join("file_index.db"), Config::default()).unwrap();
        app.perform_full_indexing(vec![source_dir.path().to_path_buf()], default_progress_callback())
            .unwrap();
        assert!(app.is_indexed().unwrap());

        let result = app.search("readme", None).unwrap();
        assert!(result.entries.iter().any(|e| e.name == "readme.md"));
    }

    #[test]
    fn monitoring_starts_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let app = SeekApp::open(&dir.path().join("db.sqlite"), Config::default()).unwrap();
        assert_eq!(app.monitoring_status(), MonitorState::Stopped);
        app.start_monitoring_with_recovery(vec![dir.path().to_path_buf()]).unwrap();
        assert_eq!(app.monitoring_status(), MonitorState::Active);
        app.stop_monitoring();
        assert_eq!(app.monitoring_status(), MonitorState::Stopped);
    }
}
