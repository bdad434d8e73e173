//! Change monitor (C8): consumes a kernel filesystem event stream, batches,
//! upserts/deletes index rows, and checkpoints a monotonic event id.

#[cfg(target_os = "macos")]
pub mod macos;
pub mod generic;

use crate::clock::Clock;
use crate::entry::{self, Entry};
use crate::error::{FilesystemError, SeekError};
use crate::exclude::ExclusionPolicy;
use crate::factory::EntryFactory;
use crate::indexer::EventIdValidityCheck;
use crate::pool::Pool;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub type EventId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFlags(pub u32);

impl EventFlags {
    pub const HISTORY_DONE: u32 = 1 << 0;
    pub const ROOT_CHANGED: u32 = 1 << 1;
    pub const MUST_SCAN_SUB_DIRS: u32 = 1 << 2;
    pub const KERNEL_DROPPED: u32 = 1 << 3;
    pub const USER_DROPPED: u32 = 1 << 4;
    pub const ITEM_IS_DIR: u32 = 1 << 5;
    pub const ITEM_CREATED: u32 = 1 << 6;
    pub const ITEM_REMOVED: u32 = 1 << 7;
    pub const ITEM_RENAMED: u32 = 1 << 8;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: PathBuf,
    pub flags: EventFlags,
    pub event_id: EventId,
}

/// Isolates the unsafe OS event-stream boundary. Implementors emit a typed
/// channel of `RawEvent`s; everything downstream of this trait is safe code.
pub trait EventSource: Send + Sync {
    fn start(
        &self,
        roots: &[PathBuf],
        since: Option<EventId>,
        tx: mpsc::Sender<RawEvent>,
    ) -> Result<(), SeekError>;

    fn stop(&self);

    /// Attempts to create a stream "since id" for `roots`; if the kernel
    /// accepts it, the id is valid.
    fn is_event_id_valid(&self, id: EventId, roots: &[PathBuf]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

const DEFAULT_BATCH_THRESHOLD: usize = 50;
const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(2000);

pub struct ChangeMonitor {
    pool: Arc<Pool>,
    policy: Arc<ExclusionPolicy>,
    clock: Arc<dyn Clock>,
    source: Arc<dyn EventSource>,
    state: RwLock<MonitorState>,
    pending_updates: Arc<RwLock<HashSet<PathBuf>>>,
    batch_threshold: usize,
    flush_delay: Duration,
    max_event_id: AtomicU64,
    stop_flag: Arc<AtomicBool>,
    worker: RwLock<Option<std::thread::JoinHandle<()>>>,
}

impl ChangeMonitor {
    pub fn new(
        pool: Arc<Pool>,
        policy: Arc<ExclusionPolicy>,
        clock: Arc<dyn Clock>,
        source: Arc<dyn EventSource>,
        batch_threshold: usize,
        flush_delay_seconds: f64,
    ) -> Self {
        Self {
            pool,
            policy,
            clock,
            source,
            state: RwLock::new(MonitorState::Stopped),
            pending_updates: Arc::new(RwLock::new(HashSet::new())),
            batch_threshold: if batch_threshold == 0 {
                DEFAULT_BATCH_THRESHOLD
            } else {
                batch_threshold
            },
            flush_delay: if flush_delay_seconds <= 0.0 {
                DEFAULT_FLUSH_DELAY
            } else {
                Duration::from_secs_f64(flush_delay_seconds)
            },
            max_event_id: AtomicU64::new(0),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: RwLock::new(None),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.read()
    }

    /// Loads `last_event_id`; if still valid for `roots`, resumes the stream
    /// from that id, otherwise starts "since now". Idempotent when already
    /// `Active`.
    pub fn start_monitoring_with_recovery(&self, roots: Vec<PathBuf>) -> Result<(), SeekError> {
        if self.state() == MonitorState::Active {
            return Ok(());
        }
        *self.state.write() = MonitorState::Starting;

        let metadata = self.pool.read(entry::read_metadata)?;
        let since = metadata
            .last_event_id
            .filter(|id| self.source.is_event_id_valid(*id, &roots));

        let (tx, rx) = mpsc::channel::<RawEvent>();
        self.source.start(&roots, since, tx).map_err(|e| {
            error!(error = %e, "failed to start filesystem event stream");
            e
        })?;

        self.stop_flag.store(false, Ordering::SeqCst);
        let pool = Arc::clone(&self.pool);
        let policy = Arc::clone(&self.policy);
        let clock = Arc::clone(&self.clock);
        let stop_flag = Arc::clone(&self.stop_flag);
        let pending = Arc::clone(&self.pending_updates);
        let batch_threshold = self.batch_threshold;
        let flush_delay = self.flush_delay;
        let max_event_id = AtomicU64::new(0);
        let max_event_id = Arc::new(max_event_id);
        let max_event_id_for_thread = Arc::clone(&max_event_id);

        let handle = std::thread::spawn(move || {
            let mut last_flush = std::time::Instant::now();
            loop {
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }
                match rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(raw) => {
                        handle_raw_event(&raw, &pending, &max_event_id_for_thread);
                        let should_flush_now = pending.read().len() >= batch_threshold;
                        if should_flush_now {
                            flush(&pool, &policy, clock.as_ref(), &pending, &max_event_id_for_thread);
                            last_flush = std::time::Instant::now();
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if !pending.read().is_empty() && last_flush.elapsed() >= flush_delay {
                            flush(&pool, &policy, clock.as_ref(), &pending, &max_event_id_for_thread);
                            last_flush = std::time::Instant::now();
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        *self.worker.write() = Some(handle);
        *self.state.write() = MonitorState::Active;
        info!("change monitor active");
        Ok(())
    }

    /// Invalidates the stream, cancels the timer, clears `pending_updates`.
    pub fn stop_monitoring(&self) {
        if self.state() == MonitorState::Stopped {
            return;
        }
        *self.state.write() = MonitorState::Stopping;
        self.source.stop();
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.write().take() {
            let _ = handle.join();
        }
        self.pending_updates.write().clear();
        *self.state.write() = MonitorState::Stopped;
    }
}

impl EventIdValidityCheck for ChangeMonitor {
    fn is_event_id_valid(&self, event_id: i64, roots: &[PathBuf]) -> bool {
        self.source.is_event_id_valid(event_id, roots)
    }
}

fn handle_raw_event(
    raw: &RawEvent,
    pending: &Arc<RwLock<HashSet<PathBuf>>>,
    max_event_id: &Arc<AtomicU64>,
) {
    if raw.flags.contains(EventFlags::HISTORY_DONE) {
        debug!("history replay done");
        return;
    }
    if raw.flags.contains(EventFlags::ROOT_CHANGED) {
        warn!(path = %raw.path.display(), "monitored root changed");
        return;
    }
    if raw.flags.contains(EventFlags::MUST_SCAN_SUB_DIRS) {
        warn!(path = %raw.path.display(), "events coalesced, subtree rescan needed");
        return;
    }
    if raw.flags.contains(EventFlags::KERNEL_DROPPED) || raw.flags.contains(EventFlags::USER_DROPPED) {
        error!(path = %raw.path.display(), "filesystem events dropped by kernel");
        return;
    }
    if !(raw.flags.contains(EventFlags::ITEM_CREATED)
        || raw.flags.contains(EventFlags::ITEM_REMOVED)
        || raw.flags.contains(EventFlags::ITEM_RENAMED))
    {
        return;
    }

    let mut prev = max_event_id.load(Ordering::Relaxed);
    while (raw.event_id as u64) > prev {
        match max_event_id.compare_exchange_weak(
            prev,
            raw.event_id as u64,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => prev = actual,
        }
    }

    pending.write().insert(raw.path.clone());
}

fn flush(
    pool: &Arc<Pool>,
    policy: &Arc<ExclusionPolicy>,
    clock: &dyn Clock,
    pending: &Arc<RwLock<HashSet<PathBuf>>>,
    max_event_id: &Arc<AtomicU64>,
) {
    let drained: Vec<PathBuf> = {
        let mut guard = pending.write();
        guard.drain().collect()
    };
    if drained.is_empty() {
        return;
    }

    let factory = EntryFactory::new(clock);
    let mut upserts: Vec<Entry> = Vec::new();
    let mut deletes: Vec<String> = Vec::new();

    for path in drained {
        match std::fs::symlink_metadata(&path) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    continue;
                }
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if policy.exclude(&path, &name, meta.is_dir()) {
                    continue;
                }
                if let Some(entry) = factory.create(&path, &meta) {
                    upserts.push(entry);
                }
            }
            Err(_) => {
                deletes.push(path.to_string_lossy().into_owned());
            }
        }
    }

    let result = pool.write(|conn| {
        if !upserts.is_empty() {
            entry::upsert_batch(conn, &upserts)?;
        }
        if !deletes.is_empty() {
            entry::delete_paths(conn, &deletes)?;
        }
        Ok(())
    });
    if let Err(e) = result {
        error!(error = %e, "monitor batch write failed");
        return;
    }

    let id = max_event_id.load(Ordering::Relaxed) as i64;
    if id > 0 {
        if let Err(e) = pool.write(|conn| entry::write_last_event_id(conn, id)) {
            warn!(error = %e, "failed to persist last_event_id");
        }
    }
}

pub fn stream_create_error(message: impl Into<String>) -> SeekError {
    SeekError::Filesystem(FilesystemError::StreamCreate(message.into()))
}

pub fn stream_start_error(message: impl Into<String>) -> SeekError {
    SeekError::Filesystem(FilesystemError::StreamStart(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::{ExclusionConfig, PoolConfig};

    struct FakeSource {
        valid: AtomicBool,
    }

    impl EventSource for FakeSource {
        fn start(
            &self,
            _roots: &[PathBuf],
            _since: Option<EventId>,
            _tx: mpsc::Sender<RawEvent>,
        ) -> Result<(), SeekError> {
            Ok(())
        }
        fn stop(&self) {}
        fn is_event_id_valid(&self, _id: EventId, _roots: &[PathBuf]) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn start_then_stop_transitions_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(Pool::open(&dir.path().join("db.sqlite"), PoolConfig::default()).unwrap());
        let policy = Arc::new(ExclusionPolicy::new(ExclusionConfig::default()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let source: Arc<dyn EventSource> = Arc::new(FakeSource {
            valid: AtomicBool::new(true),
        });
        let monitor = ChangeMonitor::new(pool, policy, clock, source, 50, 2.0);
        assert_eq!(monitor.state(), MonitorState::Stopped);
        monitor
            .start_monitoring_with_recovery(vec![dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(monitor.state(), MonitorState::Active);
        monitor.stop_monitoring();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[test]
    fn start_is_idempotent_when_already_active() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(Pool::open(&dir.path().join("db.sqlite"), PoolConfig::default()).unwrap());
        let policy = Arc::new(ExclusionPolicy::new(ExclusionConfig::default()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let source: Arc<dyn EventSource> = Arc::new(FakeSource {
            valid: AtomicBool::new(true),
        });
        let monitor = ChangeMonitor::new(pool, policy, clock, source, 50, 2.0);
        monitor
            .start_monitoring_with_recovery(vec![dir.path().to_path_buf()])
            .unwrap();
        monitor
            .start_monitoring_with_recovery(vec![dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(monitor.state(), MonitorState::Active);
        monitor.stop_monitoring();
    }
}
