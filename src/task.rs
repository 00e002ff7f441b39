//! Cancellable task primitives shared by the sync and search pipelines
//!
//! Each pipeline runs at most one task at a time. The single-flight
//! guarantee is enforced by [`TaskSlot`], and cooperative cancellation
//! is carried by [`CancelToken`]: the blocking engine call polls the
//! token at its own pace, there is no preemption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag observable from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The blocking call observes the flag at its
    /// next poll point and returns an `Aborted` outcome.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Single-slot "active task" guard.
///
/// `acquire` succeeds for exactly one holder at a time; the slot frees
/// itself when the returned [`SlotGuard`] is dropped by the worker.
#[derive(Debug, Default)]
pub struct TaskSlot {
    active: Arc<AtomicBool>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to mark the slot active. Returns `None` if a task already
    /// holds it.
    pub fn acquire(&self) -> Option<SlotGuard> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(SlotGuard {
                active: self.active.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Releases the owning [`TaskSlot`] on drop.
#[derive(Debug)]
pub struct SlotGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
