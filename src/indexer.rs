//! Indexer (C7): orchestrates full/smart indexing, batching, bulk-mode
//! pragmas, and progress reporting.

use crate::clock::Clock;
use crate::config::ConcurrencyConfig;
use crate::entry::{self, Entry};
use crate::error::{IndexingError, SeekError};
use crate::exclude::ExclusionPolicy;
use crate::factory::EntryFactory;
use crate::scanner::{ScanOptions, Scanner};
use crate::workqueue::WorkQueue;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub fraction: f64,
    pub processed: u64,
    pub total: u64,
    pub message: Option<String>,
}

pub type ProgressCallback = Arc<dyn Fn(IndexProgress) + Send + Sync>;

/// Checks whether a previously stored event-id cursor is still accepted by
/// the live kernel event stream for a set of roots. Implemented by the
/// change monitor (C8); kept as a trait here so the indexer doesn't depend
/// on the monitor module.
pub trait EventIdValidityCheck: Send + Sync {
    fn is_event_id_valid(&self, event_id: i64, roots: &[PathBuf]) -> bool;
}

#[derive(Debug, Default)]
pub struct IndexingStatistics {
    pub total_processed: AtomicU64,
    pub excluded_path_count: AtomicU64,
    pub symlink_count: AtomicU64,
    pub rebuilt_count: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

use parking_lot::Mutex;

impl IndexingStatistics {
    pub fn start(&self) {
        *self.started_at.lock() = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    pub fn processed_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_processed.load(Ordering::Relaxed) as f64 / secs
    }
}

pub struct Indexer {
    pool: Arc<crate::pool::Pool>,
    policy: Arc<ExclusionPolicy>,
    clock: Arc<dyn Clock>,
    concurrency: ConcurrencyConfig,
}

impl Indexer {
    pub fn new(
        pool: Arc<crate::pool::Pool>,
        policy: Arc<ExclusionPolicy>,
        clock: Arc<dyn Clock>,
        concurrency: ConcurrencyConfig,
    ) -> Self {
        Self {
            pool,
            policy,
            clock,
            concurrency,
        }
    }

    /// If the store is already indexed and the stored event-id cursor is
    /// still valid for `roots`, this is a no-op: incremental updates are
    /// delivered live by the change monitor. Otherwise falls through to a
    /// full reindex.
    pub fn perform_smart_indexing(
        &self,
        roots: &[PathBuf],
        validity: &dyn EventIdValidityCheck,
        progress: ProgressCallback,
    ) -> Result<IndexingStatistics, SeekError> {
        let metadata = self.pool.read(entry::read_metadata)?;
        if metadata.is_indexed {
            if let Some(event_id) = metadata.last_event_id {
                if validity.is_event_id_valid(event_id, roots) {
                    info!("smart indexing: stored event id still valid, skipping full scan");
                    return Ok(IndexingStatistics::default());
                }
            }
        }
        self.perform_full_indexing(roots, progress)
    }

    pub fn perform_full_indexing(
        &self,
        roots: &[PathBuf],
        progress: ProgressCallback,
    ) -> Result<IndexingStatistics, SeekError> {
        let stats = Arc::new(IndexingStatistics::default());
        stats.start();
        progress(IndexProgress {
            fraction: 0.0,
            processed: 0,
            total: 0,
            message: Some("starting full index".to_string()),
        });

        let existing_count = self.pool.read(entry::count_entries)?;
        let metadata = self.pool.read(entry::read_metadata)?;
        if existing_count > 0 || !metadata.is_indexed {
            self.pool.write(|conn| {
                entry::truncate_entries(conn)?;
                entry::write_metadata(
                    conn,
                    &crate::entry::IndexingMetadata {
                        is_indexed: false,
                        last_indexed_date: None,
                        indexed_paths: None,
                        total_files_indexed: 0,
                        indexing_version: metadata.indexing_version.max(1),
                        last_event_id: None,
                    },
                )
            })?;
        }

        self.pool.enter_bulk_mode()?;

        let run_result = self.run_full_indexing_body(roots, &stats, &progress);
        match run_result {
            Ok(()) => {
                if let Err(e) = self.pool.exit_bulk_mode() {
                    error!(error = %e, "bulk commit failed, reverting to not-indexed");
                    let _ = self.pool.abort_bulk_mode();
                    return Err(SeekError::Indexing(IndexingError::Failed(e.to_string())));
                }
            }
            Err(e) => {
                error!(error = %e, "full indexing failed, rolling back");
                let _ = self.pool.abort_bulk_mode();
                return Err(e);
            }
        }

        let total = self.pool.read(entry::count_entries)?;
        self.pool.write(|conn| {
            entry::write_metadata(
                conn,
                &crate::entry::IndexingMetadata {
                    is_indexed: true,
                    last_indexed_date: Some(self.clock.now()),
                    indexed_paths: Some(
                        roots
                            .iter()
                            .map(|p| p.to_string_lossy().into_owned())
                            .collect(),
                    ),
                    total_files_indexed: total,
                    indexing_version: metadata.indexing_version.max(1),
                    last_event_id: None,
                },
            )
        })?;

        progress(IndexProgress {
            fraction: 1.0,
            processed: stats.total_processed.load(Ordering::Relaxed),
            total: total as u64,
            message: Some("full index complete".to_string()),
        });

        Ok(Arc::try_unwrap(stats).unwrap_or_else(|arc| IndexingStatistics {
            total_processed: AtomicU64::new(arc.total_processed.load(Ordering::Relaxed)),
            excluded_path_count: AtomicU64::new(arc.excluded_path_count.load(Ordering::Relaxed)),
            symlink_count: AtomicU64::new(arc.symlink_count.load(Ordering::Relaxed)),
            rebuilt_count: AtomicU64::new(arc.rebuilt_count.load(Ordering::Relaxed)),
            started_at: Mutex::new(None),
        }))
    }

    fn write_batch(&self, entries: &[Entry]) -> Result<(), SeekError> {
        for chunk in entries.chunks(self.concurrency.batch_size.max(1)) {
            if let Err(e) = self.pool.write(|conn| entry::upsert_batch(conn, chunk)) {
                warn!(error = %e, "batch insert failed, skipped");
            }
        }
        Ok(())
    }

    fn run_full_indexing_body(
        &self,
        roots: &[PathBuf],
        stats: &Arc<IndexingStatistics>,
        progress: &ProgressCallback,
    ) -> Result<(), SeekError> {
        let scan_options = ScanOptions {
            skip_package_descendants: true,
            skip_hidden: false,
        };

        for root in roots {
            if !root.exists() {
                return Err(SeekError::Indexing(IndexingError::PathNotFound(
                    root.clone(),
                )));
            }

            let scanner = Scanner::new(&self.policy, self.clock.as_ref(), scan_options);
            let root_files = scanner.scan_root_level_files(root);
            self.write_batch(&root_files)?;
            stats
                .total_processed
                .fetch_add(root_files.len() as u64, Ordering::Relaxed);

            let top_dirs = scanner.top_level_directories(root);
            let queue: Arc<WorkQueue<PathBuf>> = Arc::new(WorkQueue::new());
            queue.seed(top_dirs);

            let worker_count = self.concurrency.full_index_workers.max(1);
            std::thread::scope(|scope| {
                for _ in 0..worker_count {
                    let queue = Arc::clone(&queue);
                    let policy = Arc::clone(&self.policy);
                    let clock = Arc::clone(&self.clock);
                    let stats = Arc::clone(stats);
                    let pool = Arc::clone(&self.pool);
                    let batch_size = self.concurrency.batch_size;
                    scope.spawn(move || {
                        queue.add_worker();
                        while let Some(dir) = queue.dequeue_for_worker() {
                            let entries =
                                process_directory(&dir, &queue, &policy, clock.as_ref(), &stats);
                            for chunk in entries.chunks(batch_size.max(1)) {
                                if let Err(e) = pool.write(|conn| entry::upsert_batch(conn, chunk))
                                {
                                    warn!(error = %e, "batch insert failed, skipped");
                                }
                            }
                            queue.worker_finished_item();
                        }
                        queue.remove_worker();
                    });
                }
            });

            progress(IndexProgress {
                fraction: 0.5,
                processed: stats.total_processed.load(Ordering::Relaxed),
                total: 0,
                message: Some(format!("indexed root {}", root.display())),
            });
        }
        Ok(())
    }
}

/// (a) emit an entry for the directory itself, (b) list its children and
/// classify each: skip symlinks, apply exclusion, bundle -> single rolled-up
/// file-entry, directory -> enqueue, else -> file entry.
fn process_directory(
    dir: &Path,
    queue: &WorkQueue<PathBuf>,
    policy: &ExclusionPolicy,
    clock: &dyn Clock,
    stats: &IndexingStatistics,
) -> Vec<Entry> {
    let factory = EntryFactory::new(clock);
    let mut out = Vec::new();

    if let Ok(meta) = std::fs::symlink_metadata(dir) {
        if let Some(e) = factory.create(dir, &meta) {
            out.push(e);
        }
    }

    let children: Vec<_> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.flatten().collect(),
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "unreadable directory treated as empty");
            return out;
        }
    };

    let processed: Vec<Option<(Entry, Option<PathBuf>)>> = children
        .into_par_iter()
        .map(|child| {
            let path = child.path();
            let name = path.file_name()?.to_string_lossy().into_owned();
            let meta = child.metadata().ok()?;
            if meta.file_type().is_symlink() {
                stats.symlink_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            if policy.exclude(&path, &name, meta.is_dir()) {
                stats.excluded_path_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            if meta.is_dir() && EntryFactory::is_bundle(&path) {
                let entry = factory.create(&path, &meta)?;
                return Some((entry, None));
            }
            if meta.is_dir() {
                let entry = factory.create(&path, &meta)?;
                return Some((entry, Some(path)));
            }
            let entry = factory.create(&path, &meta)?;
            Some((entry, None))
        })
        .collect();

    for item in processed.into_iter().flatten() {
        let (entry, maybe_dir) = item;
        out.push(entry);
        if let Some(subdir) = maybe_dir {
            queue.enqueue(subdir);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::{ConcurrencyConfig, ExclusionConfig, PoolConfig};
    use crate::pool::Pool;

    struct AlwaysInvalid;
    impl EventIdValidityCheck for AlwaysInvalid {
        fn is_event_id_valid(&self, _event_id: i64, _roots: &[PathBuf]) -> bool {
            false
        }
    }

    fn setup(dir: &Path) -> Indexer {
        let pool = Arc::new(Pool::open(&dir.join("db.sqlite"), PoolConfig::default()).unwrap());
        let policy = Arc::new(ExclusionPolicy::new(ExclusionConfig::default()));
        let clock = Arc::new(SystemClock);
        Indexer::new(pool, policy, clock, ConcurrencyConfig::default())
    }

    #[test]
    fn full_indexing_discovers_nested_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("readme.md"), "x").unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        std::fs::write(root.path().join("sub/nested.txt"), "y").unwrap();

        let store_dir = tempfile::tempdir().unwrap();
        let indexer = setup(store_dir.path());
        let noop = Arc::new(|_p: IndexProgress| {});
        let stats = indexer
            .perform_full_indexing(&[root.path().to_path_buf()], noop)
            .unwrap();
        assert!(stats.total_processed.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn smart_indexing_skips_when_event_id_still_valid() {
        struct AlwaysValid;
        impl EventIdValidityCheck for AlwaysValid {
            fn is_event_id_valid(&self, _event_id: i64, _roots: &[PathBuf]) -> bool {
                true
            }
        }
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "x").unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let indexer = setup(store_dir.path());
        let noop = Arc::new(|_p: IndexProgress| {});
        indexer
            .perform_full_indexing(&[root.path().to_path_buf()], Arc::clone(&noop))
            .unwrap();

        indexer
            .pool
            .write(|conn| {
                entry::write_last_event_id(conn, 7)
            })
            .unwrap();

        let stats = indexer
            .perform_smart_indexing(&[root.path().to_path_buf()], &AlwaysValid, noop)
            .unwrap();
        assert_eq!(stats.total_processed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn smart_indexing_falls_back_to_full_when_invalid() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), "x").unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let indexer = setup(store_dir.path());
        let noop = Arc::new(|_p: IndexProgress| {});
        let stats = indexer
            .perform_smart_indexing(&[root.path().to_path_buf()], &AlwaysInvalid, noop)
            .unwrap();
        assert!(stats.total_processed.load(Ordering::Relaxed) >= 1);
    }
}
