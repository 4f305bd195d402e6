//! Per-loop read buffer pool.
//!
//! Every connection reads into one fixed-size buffer taken from this pool
//! when it is accepted and returned when it is closed, so the hot path never
//! allocates. The pool is one contiguous allocation carved into equal
//! slices; the memory never moves, which keeps pointers handed to the
//! engine valid for as long as the buffer stays allocated.

use std::ptr::NonNull;

/// Pool of equally sized buffers backed by a single allocation.
pub struct BufferPool {
    /// Start of `len` bytes owned by the pool, `buffer_size` per buffer.
    /// Only ever accessed through raw pointers derived from it.
    base: NonNull<u8>,
    len: usize,
    /// Stack of available buffer indices (LIFO for cache locality).
    free_list: Vec<usize>,
    /// Whether each buffer is currently handed out.
    in_use: Vec<bool>,
    /// Size of each buffer.
    buffer_size: usize,
}

impl BufferPool {
    /// Create a new buffer pool.
    ///
    /// # Arguments
    /// * `count` - Number of buffers to pre-allocate
    /// * `size` - Size of each buffer in bytes
    pub fn new(count: usize, size: usize) -> Self {
        let memory = vec![0u8; count * size].into_boxed_slice();
        let len = memory.len();
        Self {
            base: NonNull::from(Box::leak(memory)).cast::<u8>(),
            len,
            // Reversed so the first allocation hands out index 0
            free_list: (0..count).rev().collect(),
            in_use: vec![false; count],
            buffer_size: size,
        }
    }

    /// Allocate a buffer from the pool.
    ///
    /// Returns `None` if no buffers are available.
    pub fn alloc(&mut self) -> Option<usize> {
        let idx = self.free_list.pop()?;
        self.in_use[idx] = true;
        Some(idx)
    }

    /// Return a buffer to the pool.
    ///
    /// Returns `false`, leaving the pool unchanged, if the buffer was not
    /// allocated.
    pub fn free(&mut self, idx: usize) -> bool {
        match self.in_use.get_mut(idx) {
            Some(in_use) if *in_use => {
                *in_use = false;
                self.free_list.push(idx);
                true
            }
            _ => false,
        }
    }

    /// Get a mutable pointer to a buffer for the engine.
    ///
    /// The pointer stays valid until the pool is dropped, and handing out
    /// one buffer never invalidates pointers to the others. Callers must not
    /// touch the buffer through other pointers while the engine owns it.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn get_ptr(&self, idx: usize) -> *mut u8 {
        assert!(idx < self.in_use.len(), "buffer index {idx} out of range");
        // In bounds: idx * buffer_size + buffer_size <= len
        unsafe { self.base.as_ptr().add(idx * self.buffer_size) }
    }

    /// Get the size of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Get the total number of buffers.
    pub fn capacity(&self) -> usize {
        self.in_use.len()
    }

    /// Get the number of available buffers.
    pub fn available(&self) -> usize {
        self.free_list.len()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        let memory = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len);
        // Reclaims the allocation leaked in `new`
        drop(unsafe { Box::from_raw(memory) });
    }
}
