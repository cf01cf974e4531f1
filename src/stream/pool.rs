//! A pool of reusable, fixed-capacity buffers (spec §3 "rented from a
//! pool"), guarded the same way the teacher guards shared mutable cache
//! state: a `parking_lot::Mutex` around a plain `Vec`.

use std::sync::Arc;

use parking_lot::Mutex;

/// Something a [`MemoryBlock`](super::block::MemoryBlock) can rent a buffer
/// from and return it to on release.
pub trait BlockPool: Send + Sync {
    /// Returns a buffer of exactly `capacity` bytes, reusing a previously
    /// returned one of at least that size if the pool has one.
    fn rent(&self, capacity: usize) -> Vec<u8>;

    /// Returns `buf` to the pool for future reuse.
    fn return_buffer(&self, buf: Vec<u8>);
}

/// A capacity-bounded free list: up to `max_free` buffers are kept around
/// for reuse rather than immediately deallocated on release.
pub struct SimplePool {
    max_free: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl SimplePool {
    pub fn new(max_free: usize) -> Arc<Self> {
        Arc::new(SimplePool {
            max_free,
            free: Mutex::new(Vec::new()),
        })
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}

impl BlockPool for SimplePool {
    fn rent(&self, capacity: usize) -> Vec<u8> {
        let mut free = self.free.lock();
        if let Some(pos) = free.iter().position(|b| b.len() >= capacity) {
            let mut buf = free.swap_remove(pos);
            buf.truncate(capacity);
            return buf;
        }
        vec![0u8; capacity]
    }

    fn return_buffer(&self, buf: Vec<u8>) {
        let mut free = self.free.lock();
        if free.len() < self.max_free {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_returned_buffers() {
        let pool = SimplePool::new(2);
        let buf = pool.rent(16);
        assert_eq!(buf.len(), 16);
        pool.return_buffer(buf);
        assert_eq!(pool.free_count(), 1);
        let buf2 = pool.rent(16);
        assert_eq!(buf2.len(), 16);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn bounded_free_list_drops_excess() {
        let pool = SimplePool::new(1);
        pool.return_buffer(vec![0; 8]);
        pool.return_buffer(vec![0; 8]);
        assert_eq!(pool.free_count(), 1);
    }
}
