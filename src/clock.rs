//! Test seam for date semantics: a fixed, externally advanceable clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that returns a fixed, externally advanceable instant.
#[derive(Debug)]
pub struct FixedClock {
    bits: AtomicU64,
}

impl FixedClock {
    pub fn new(epoch_seconds: f64) -> Self {
        Self {
            bits: AtomicU64::new(epoch_seconds.to_bits()),
        }
    }

    pub fn set(&self, epoch_seconds: f64) {
        self.bits.store(epoch_seconds.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
