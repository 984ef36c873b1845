//! A single contiguous growable byte buffer.
//!
//! `Vec<u8>` already gives monotonic growth, safe insert/remove and
//! capacity tracking, so this is a thin newtype that keeps the
//! reference implementation's vocabulary (`ensure`, `writable_buffer`,
//! `readable_buffer`) rather than a rewrite from scratch.

#[derive(Debug, Default, Clone)]
pub struct GrowBuffer {
    data: Vec<u8>,
}

impl GrowBuffer {
    pub fn new() -> Self {
        GrowBuffer { data: Vec::new() }
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Reserve room for at least `need` additional bytes.
    pub fn ensure(&mut self, need: usize) {
        self.data.reserve(need);
    }

    /// Reserve room for `need` bytes, growing by at least `grow_amount`
    /// when a reallocation is needed, to amortize repeated small grows.
    pub fn ensure2(&mut self, need: usize, grow_amount: usize) {
        if self.data.capacity() - self.data.len() < need {
            self.data.reserve(need.max(grow_amount));
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn insert_at(&mut self, offset: usize, bytes: &[u8]) {
        self.data.splice(offset..offset, bytes.iter().copied());
    }

    pub fn remove_at(&mut self, offset: usize, len: usize) {
        self.data.drain(offset..offset + len);
    }

    /// The used prefix.
    pub fn readable_buffer(&self) -> &[u8] {
        &self.data
    }

    /// The unused tail capacity, as an empty-but-reserved slice marker;
    /// writers append directly via `append`/`insert_at` instead of
    /// writing through this view (Rust has no uninitialized-slice
    /// equivalent of the C `writable_buffer` without `unsafe`).
    pub fn writable_buffer(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_clear() {
        let mut b = GrowBuffer::new();
        b.append(b"hello");
        assert_eq!(b.readable_buffer(), b"hello");
        b.clear();
        assert_eq!(b.count(), 0);
    }

    #[test]
    fn insert_and_remove_preserve_surrounding_bytes() {
        let mut b = GrowBuffer::new();
        b.append(b"ace");
        b.insert_at(1, b"b");
        assert_eq!(b.readable_buffer(), b"abce");
        b.remove_at(2, 1);
        assert_eq!(b.readable_buffer(), b"abe");
    }
}
