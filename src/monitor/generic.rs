//! Cross-platform `EventSource` built on the safe `notify` crate. Used for
//! every target other than macOS, which gets the raw FSEvents adapter in
//! `super::macos`. `notify` does not surface a kernel event id, so one is
//! synthesized as a local monotonically increasing counter.

use super::{stream_create_error, stream_start_error, EventFlags, EventId, EventSource, RawEvent};
use crate::error::SeekError;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc;

pub struct NotifyEventSource {
    watcher: Mutex<Option<RecommendedWatcher>>,
    counter: AtomicI64,
}

impl Default for NotifyEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyEventSource {
    pub fn new() -> Self {
        Self {
            watcher: Mutex::new(None),
            counter: AtomicI64::new(0),
        }
    }
}

impl EventSource for NotifyEventSource {
    fn start(
        &self,
        roots: &[PathBuf],
        _since: Option<EventId>,
        tx: mpsc::Sender<RawEvent>,
    ) -> Result<(), SeekError> {
        let counter = AtomicI64::new(self.counter.load(Ordering::SeqCst));
        let handler = move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            let flags = classify(&event);
            for path in event.paths.iter() {
                let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = tx.send(RawEvent {
                    path: path.clone(),
                    flags,
                    event_id: id,
                });
            }
        };

        let mut watcher = RecommendedWatcher::new(handler, Config::default())
            .map_err(|e| stream_create_error(e.to_string()))?;

        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| stream_start_error(e.to_string()))?;
        }

        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    fn stop(&self) {
        *self.watcher.lock() = None;
    }

    /// `notify` has no kernel-side resume cursor to validate against; a
    /// synthesized id is always accepted, so a fresh watch always starts
    /// "since now" semantics rather than rejecting.
    fn is_event_id_valid(&self, _id: EventId, _roots: &[PathBuf]) -> bool {
        false
    }
}

fn classify(event: &Event) -> EventFlags {
    let mut bits = 0u32;
    match event.kind {
        EventKind::Create(_) => bits |= EventFlags::ITEM_CREATED,
        EventKind::Remove(_) => bits |= EventFlags::ITEM_REMOVED,
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => bits |= EventFlags::ITEM_RENAMED,
        _ => {}
    }
    if event.paths.iter().any(|p| p.is_dir()) {
        bits |= EventFlags::ITEM_IS_DIR;
    }
    EventFlags(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_event_ids_are_never_considered_valid_across_restarts() {
        let source = NotifyEventSource::new();
        assert!(!source.is_event_id_valid(1, &[]));
    }
}
