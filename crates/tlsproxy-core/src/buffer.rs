//! Fixed-capacity byte buffer with `(begin, end)` offsets.
//!
//! Replaces the original's manual `malloc`'d region and raw pointer
//! arithmetic with a safe, bounds-checked abstraction. Data in
//! `[begin, end)` is unsent/unread; once drained (`begin == end`) both
//! offsets reset to zero so the buffer always offers its full capacity
//! as a contiguous writable tail.

/// A fixed-capacity plaintext buffer for one direction of one connection.
pub struct Buffer {
    data: Vec<u8>,
    begin: usize,
    end: usize,
}

impl Buffer {
    /// Allocate a buffer with the given fixed capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            begin: 0,
            end: 0,
        }
    }

    /// Total capacity of this buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently buffered and awaiting drain.
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// `true` when there is no buffered data.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// `true` when the buffer has no remaining writable capacity.
    pub fn is_full(&self) -> bool {
        self.end == self.data.len()
    }

    /// The unsent/unread bytes, `[begin, end)`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.begin..self.end]
    }

    /// The writable tail, `[end, capacity)`.
    pub fn writable_tail(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Record that `n` bytes were written into the writable tail.
    pub fn advance_write(&mut self, n: usize) {
        assert!(self.end + n <= self.data.len(), "buffer write overflow");
        self.end += n;
    }

    /// Discard all buffered bytes without writing them anywhere.
    ///
    /// Used when a drain write fails during teardown: spec.md §4.4 says
    /// the remaining unsent bytes are discarded and teardown proceeds.
    pub fn clear(&mut self) {
        self.begin = 0;
        self.end = 0;
    }

    /// Record that `n` bytes were drained from the readable head.
    ///
    /// Resets both offsets to zero once the buffer is fully drained, so
    /// the next write always has the full capacity available.
    pub fn advance_read(&mut self, n: usize) {
        assert!(self.begin + n <= self.end, "buffer read underflow");
        self.begin += n;
        if self.begin == self.end {
            self.begin = 0;
            self.end = 0;
        }
    }
}
