//! Change-notification dispatch (spec §4.4 "Change-notification dispatch",
//! §9 "Notification dispatcher").
//!
//! Handlers are never invoked while the cascade mutex is held. A
//! `NotifyContext` stands in for .NET's `SynchronizationContext`: the
//! in-process default schedules on the calling thread's own queue captured
//! at subscribe time, a worker-thread fallback dispatches through a
//! `crossbeam_channel`, mirroring the message bus the teacher uses for its
//! migration policy reports (`migration::msg`).

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

/// What changed on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Value,
    Comment,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A place a change-notification handler is scheduled to run.
pub trait NotifyContext: Send + Sync {
    fn schedule(&self, job: Job);
}

/// Runs the handler immediately, on whichever thread triggered the change.
/// Suitable for tests and single-threaded callers; matches the "registering
/// caller's notification context" case when no real context was captured.
pub struct InlineContext;

impl NotifyContext for InlineContext {
    fn schedule(&self, job: Job) {
        job();
    }
}

/// A small dedicated worker thread that runs scheduled jobs in order,
/// serving as the fallback dispatcher when a subscriber captured no
/// notification context (spec §9's "thread-pool dispatch").
pub struct WorkerContext {
    sender: Sender<Job>,
    _handle: JoinHandle<()>,
}

impl WorkerContext {
    pub fn new() -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("strata-notify".into())
            .spawn(move || {
                for job in receiver.iter() {
                    job();
                }
            })
            .expect("failed to spawn notification worker thread");
        WorkerContext {
            sender,
            _handle: handle,
        }
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyContext for WorkerContext {
    fn schedule(&self, job: Job) {
        // An unbounded channel send only fails if the worker thread panicked
        // and dropped the receiver; there is nowhere useful to surface that
        // here, so the notification is simply dropped.
        let _ = self.sender.send(job);
    }
}

lazy_static::lazy_static! {
    /// Process-global worker dispatcher used when a subscriber supplies no
    /// explicit [`NotifyContext`].
    pub static ref GLOBAL_WORKER: Arc<WorkerContext> = Arc::new(WorkerContext::new());
}

/// A single registered handler: the context it must run on, and the closure
/// itself.
pub struct Subscription {
    pub context: Arc<dyn NotifyContext>,
    pub handler: Arc<dyn Fn(ChangeKind) + Send + Sync>,
}

impl Subscription {
    pub fn new(
        context: Arc<dyn NotifyContext>,
        handler: impl Fn(ChangeKind) + Send + Sync + 'static,
    ) -> Self {
        Subscription {
            context,
            handler: Arc::new(handler),
        }
    }

    pub fn fire(&self, kind: ChangeKind) {
        let handler = self.handler.clone();
        self.context.schedule(Box::new(move || handler(kind)));
    }
}
