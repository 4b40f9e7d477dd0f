//! Admission control.
//!
//! A worker runs at most one benchmark session at a time. Each call tries to
//! take the [`AdmissionGuard`]; the returned [`AdmissionPermit`] releases it
//! when dropped, so every exit path of a session frees the worker.

use std::sync::atomic::{AtomicBool, Ordering};

/// Exclusive admission flag owned by a worker.
#[derive(Debug, Default)]
pub struct AdmissionGuard {
    busy: AtomicBool,
}

impl AdmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard if it is free.
    ///
    /// Returns `None` without touching any state when another permit is live.
    pub fn try_acquire(&self) -> Option<AdmissionPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AdmissionPermit { guard: self })
    }

    /// Whether a permit is currently held.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of admission. Releases the guard on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct AdmissionPermit<'a> {
    guard: &'a AdmissionGuard,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        let was_busy = self.guard.busy.swap(false, Ordering::AcqRel);
        debug_assert!(was_busy, "admission permit released a free guard");
    }
}
