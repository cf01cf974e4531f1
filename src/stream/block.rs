//! Chainable memory blocks (spec §4.7) — the pooled fixed-size buffers a
//! [`super::core::MemoryBlockStream`] links into a chain.
//!
//! Singly-linked (the "either is acceptable, pick one" choice from spec
//! §9): seeking from the stream's end walks the whole chain from the head,
//! documented as O(n) on [`super::core::MemoryBlockStream::seek`].

use std::sync::Arc;

use crate::stream::pool::BlockPool;

/// One fixed-capacity buffer, optionally rented from a pool it returns its
/// buffer to on release, with a link to the next block in the chain.
pub struct MemoryBlock {
    buffer: Option<Vec<u8>>,
    capacity: usize,
    length: usize,
    pool: Option<Arc<dyn BlockPool>>,
    released: bool,
    next: Option<Box<MemoryBlock>>,
}

impl MemoryBlock {
    /// Allocates a heap-owned, zero-initialized block of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        MemoryBlock {
            buffer: Some(vec![0u8; capacity]),
            capacity,
            length: 0,
            pool: None,
            released: false,
            next: None,
        }
    }

    /// Rents a buffer of `capacity` bytes from `pool`. `clear` zeroes the
    /// rented buffer first — a pooled buffer otherwise carries whatever
    /// bytes its previous tenant left behind, which is fine for a stream
    /// write (which fully overwrites before any read observes it) but not
    /// for a caller that needs the buffer pre-zeroed.
    pub fn new_from_pool(capacity: usize, pool: Arc<dyn BlockPool>, clear: bool) -> Self {
        let mut buffer = pool.rent(capacity);
        debug_assert_eq!(buffer.len(), capacity);
        if clear {
            buffer.iter_mut().for_each(|b| *b = 0);
        }
        MemoryBlock {
            buffer: Some(buffer),
            capacity,
            length: 0,
            pool: Some(pool),
            released: false,
            next: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Sets the block's logical length. `len` must not exceed `capacity` —
    /// every call site derives `len` from a bounded write or a capacity
    /// check, so violating this is a caller bug.
    pub fn set_length(&mut self, len: usize) {
        assert!(len <= self.capacity, "block length exceeds capacity");
        self.length = len;
    }

    /// The block's data, up to `length`.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer.as_deref().unwrap_or(&[])[..self.length]
    }

    /// The block's data, up to `length`, mutably.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        let len = self.length;
        &mut self.buffer.as_deref_mut().expect("use of a released block")[..len]
    }

    /// The full backing slice up to `capacity`, for writes that extend
    /// `length` or that need to reach past it (e.g. splice displacement).
    pub fn capacity_slice_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().expect("use of a released block")
    }

    pub fn next(&self) -> Option<&MemoryBlock> {
        self.next.as_deref()
    }

    pub fn next_mut(&mut self) -> Option<&mut MemoryBlock> {
        self.next.as_deref_mut()
    }

    pub(crate) fn next_link_mut(&mut self) -> &mut Option<Box<MemoryBlock>> {
        &mut self.next
    }

    pub fn take_next(&mut self) -> Option<Box<MemoryBlock>> {
        self.next.take()
    }

    pub fn set_next(&mut self, next: Option<Box<MemoryBlock>>) {
        self.next = next;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the buffer to its pool, if any. Idempotent: releasing an
    /// already-released block is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match (self.buffer.take(), self.pool.take()) {
            (Some(buf), Some(pool)) => pool.return_buffer(buf),
            _ => {}
        }
        self.length = 0;
    }

    /// Releases this block and every block linked after it.
    pub fn release_chain(&mut self) {
        self.release();
        let mut next = self.next.take();
        while let Some(mut block) = next {
            block.release();
            next = block.next.take();
        }
    }

    /// Sum of `length` across this block and every block linked after it.
    pub fn chain_length(&self) -> u64 {
        let mut total = self.length as u64;
        let mut cur = self.next.as_deref();
        while let Some(block) = cur {
            total += block.length as u64;
            cur = block.next.as_deref();
        }
        total
    }

    /// The number of blocks in this chain, this block included.
    pub fn chain_block_count(&self) -> usize {
        let mut count = 1;
        let mut cur = self.next.as_deref();
        while let Some(block) = cur {
            count += 1;
            cur = block.next.as_deref();
        }
        count
    }

    /// Copies the whole chain's data into one contiguous buffer. Defined
    /// only for chains no longer than `i32::MAX` bytes (spec §4.7).
    pub fn get_chain_data(&self) -> Vec<u8> {
        let total = self.chain_length();
        assert!(total <= i32::MAX as u64, "chain too long to flatten");
        let mut out = Vec::with_capacity(total as usize);
        out.extend_from_slice(self.buffer());
        let mut cur = self.next.as_deref();
        while let Some(block) = cur {
            out.extend_from_slice(block.buffer());
            cur = block.next.as_deref();
        }
        out
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::pool::SimplePool;

    #[test]
    fn release_is_idempotent() {
        let mut block = MemoryBlock::new(8);
        block.set_length(4);
        block.release();
        assert!(block.is_released());
        block.release();
        assert!(block.is_released());
    }

    #[test]
    fn release_returns_buffer_to_pool() {
        let pool = SimplePool::new(4);
        let mut block = MemoryBlock::new_from_pool(16, pool.clone(), true);
        block.set_length(16);
        block.release();
        let rented_again = pool.rent(16);
        assert_eq!(rented_again.len(), 16);
    }

    #[test]
    fn chain_length_sums_across_links() {
        let mut a = MemoryBlock::new(4);
        a.set_length(4);
        let mut b = MemoryBlock::new(4);
        b.set_length(2);
        a.set_next(Some(Box::new(b)));
        assert_eq!(a.chain_length(), 6);
        assert_eq!(a.chain_block_count(), 2);
    }

    #[test]
    fn get_chain_data_flattens_blocks() {
        let mut a = MemoryBlock::new(4);
        a.capacity_slice_mut().copy_from_slice(&[1, 2, 3, 4]);
        a.set_length(4);
        let mut b = MemoryBlock::new(4);
        b.capacity_slice_mut()[..2].copy_from_slice(&[5, 6]);
        b.set_length(2);
        a.set_next(Some(Box::new(b)));
        assert_eq!(a.get_chain_data(), vec![1, 2, 3, 4, 5, 6]);
    }
}
