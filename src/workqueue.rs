//! Work-queue coordinator (C6). Solves "is the recursive walk finished?"
//! without deadlock or premature exit: a worker exits only when the queue
//! is empty *and* `busy_workers == 0`, i.e. no other worker can still push
//! more work.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    total_workers: AtomicUsize,
    busy_workers: AtomicUsize,
    completed: Mutex<bool>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            total_workers: AtomicUsize::new(0),
            busy_workers: AtomicUsize::new(0),
            completed: Mutex::new(false),
        }
    }

    pub fn seed(&self, items: impl IntoIterator<Item = T>) {
        self.items.lock().extend(items);
    }

    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    pub fn add_worker(&self) {
        self.total_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn remove_worker(&self) {
        self.total_workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Block (short-polling) until an item is available or the walk is
    /// provably complete. Returns `None` only when `queue.empty() &&
    /// busy_workers == 0`.
    pub fn dequeue_for_worker(&self) -> Option<T> {
        loop {
            {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    self.busy_workers.fetch_add(1, Ordering::SeqCst);
                    return Some(item);
                }
                if self.busy_workers.load(Ordering::SeqCst) == 0 {
                    *self.completed.lock() = true;
                    return None;
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Call after finishing processing of an item dequeued via
    /// `dequeue_for_worker`. Any enqueues the item produced (subdirectories)
    /// must already have happened before this call.
    pub fn worker_finished_item(&self) {
        self.busy_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        *self.completed.lock()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_worker_drains_seeded_queue_and_completes() {
        let q: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());
        q.seed([1, 2, 3]);
        q.add_worker();
        let mut seen = Vec::new();
        while let Some(item) = q.dequeue_for_worker() {
            seen.push(item);
            q.worker_finished_item();
        }
        q.remove_worker();
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(q.is_completed());
    }

    #[test]
    fn worker_can_enqueue_more_work_before_finishing() {
        let q: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());
        q.seed([1]);
        q.add_worker();
        let first = q.dequeue_for_worker().unwrap();
        assert_eq!(first, 1);
        q.enqueue(2);
        q.worker_finished_item();
        let second = q.dequeue_for_worker().unwrap();
        assert_eq!(second, 2);
        q.worker_finished_item();
        assert!(q.dequeue_for_worker().is_none());
    }

    #[test]
    fn concurrent_workers_all_drain_without_premature_exit() {
        let q: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());
        q.seed(0..20);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    q.add_worker();
                    let mut count = 0;
                    while let Some(item) = q.dequeue_for_worker() {
                        count += 1;
                        if item < 15 {
                            // simulate children discovered mid-processing
                        }
                        q.worker_finished_item();
                    }
                    q.remove_worker();
                    count
                })
            })
            .collect();
        let total: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 20);
    }
}
