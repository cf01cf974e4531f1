//! The single mutex shared by a base layer and every layer inheriting from
//! it (spec §4.2: "a shared mutex object... one per cascade"), plus the
//! machinery that defers change-notification dispatch until the outermost
//! lock in the current call releases.
//!
//! Mutation of the tree (adding items/children, setting values) always
//! happens while this lock is held, and internal operations reenter it
//! freely (e.g. `add_item` on a base layer recurses into each inheriting
//! layer's tree while still holding the lock the outer call took), so the
//! lock itself must be reentrant. `parking_lot::ReentrantMutex` provides
//! that; the depth counter and pending-notification queue are thread-local
//! so notifications fire exactly once, after the call that originally
//! entered the cascade returns, and never while the lock is held.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use parking_lot::ReentrantMutex;

thread_local! {
    static DEPTH: RefCell<usize> = RefCell::new(0);
    static PENDING: RefCell<Vec<Box<dyn FnOnce() + Send>>> = RefCell::new(Vec::new());
}

/// Queues a notification job to run once the outermost cascade lock for the
/// current call releases.
pub(crate) fn defer(job: Box<dyn FnOnce() + Send>) {
    PENDING.with(|p| p.borrow_mut().push(job));
}

/// The mutex and modification flag shared by a base layer and its whole
/// cascade of inheriting layers.
pub struct Cascade {
    mutex: ReentrantMutex<()>,
    modified: AtomicBool,
}

impl Cascade {
    pub fn new() -> Self {
        Cascade {
            mutex: ReentrantMutex::new(()),
            modified: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> CascadeGuard<'_> {
        let top_level = DEPTH.with(|d| {
            let mut d = d.borrow_mut();
            let was_zero = *d == 0;
            *d += 1;
            was_zero
        });
        CascadeGuard {
            _guard: Some(self.mutex.lock()),
            top_level,
        }
    }

    pub fn mark_modified(&self) {
        self.modified.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(AtomicOrdering::Relaxed)
    }

    pub fn clear_modified(&self) {
        self.modified.store(false, AtomicOrdering::Relaxed);
    }
}

impl Default for Cascade {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CascadeGuard<'a> {
    _guard: Option<parking_lot::ReentrantMutexGuard<'a, ()>>,
    top_level: bool,
}

impl Drop for CascadeGuard<'_> {
    fn drop(&mut self) {
        // Release the lock itself before running any deferred notification,
        // so handlers never observe it held.
        self._guard.take();

        let reached_zero = DEPTH.with(|d| {
            let mut d = d.borrow_mut();
            *d -= 1;
            *d == 0
        });

        if self.top_level {
            debug_assert!(reached_zero);
            let jobs = PENDING.with(|p| std::mem::take(&mut *p.borrow_mut()));
            for job in jobs {
                job();
            }
        }
    }
}
