//! Growable output buffer: inline heapless storage spilling to the heap.
//!
//! `OutputBuffer<N>` starts on `N` bytes of inline storage and migrates to a
//! heap allocation the first time a write would not fit. It is the canonical
//! container for everything the engine emits (records, flights, alerts).
//! Because buffers routinely hold key material and plaintext, [`release`]
//! zeroizes the contents before freeing them; `Drop` does the same.
//!
//! [`release`]: OutputBuffer::release

use alloc::vec::Vec;
use zeroize::Zeroize;

/// Default inline capacity, enough for a typical first flight.
pub const DEFAULT_INLINE_CAPACITY: usize = 512;

/// Append-only byte buffer with inline-first storage.
pub struct OutputBuffer<const N: usize = DEFAULT_INLINE_CAPACITY> {
    inline: heapless::Vec<u8, N>,
    heap: Option<Vec<u8>>,
}

impl<const N: usize> OutputBuffer<N> {
    /// New empty buffer on inline storage.
    pub const fn new() -> Self {
        Self {
            inline: heapless::Vec::new(),
            heap: None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.heap {
            Some(v) => v.len(),
            None => self.inline.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the contents have spilled to the heap.
    pub fn is_heap_backed(&self) -> bool {
        self.heap.is_some()
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.heap {
            Some(v) => v,
            None => &self.inline,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.heap {
            Some(v) => v,
            None => &mut self.inline,
        }
    }

    /// Ensure capacity for `additional` more bytes, spilling if needed.
    pub fn reserve(&mut self, additional: usize) {
        match &mut self.heap {
            Some(v) => v.reserve(additional),
            None => {
                if self.inline.len() + additional > N {
                    self.spill(additional);
                }
            }
        }
    }

    /// Append bytes, growing as required.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        match &mut self.heap {
            Some(v) => v.extend_from_slice(data),
            None => {
                if self.inline.extend_from_slice(data).is_err() {
                    self.spill(data.len());
                    // spill leaves us heap-backed
                    if let Some(v) = &mut self.heap {
                        v.extend_from_slice(data);
                    }
                }
            }
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.extend_from_slice(&[byte]);
    }

    /// Shorten to `len` bytes. Truncated tail is wiped.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        match &mut self.heap {
            Some(v) => {
                v[len..].zeroize();
                v.truncate(len);
            }
            None => {
                self.inline[len..].zeroize();
                self.inline.truncate(len);
            }
        }
    }

    /// Remove `n` bytes from the front by shifting remaining data forward.
    pub fn drain_front(&mut self, n: usize) {
        let len = self.len();
        let n = n.min(len);
        let slice = self.as_mut_slice();
        slice.copy_within(n.., 0);
        self.truncate(len - n);
    }

    /// Wipe and discard all contents, returning to inline storage.
    pub fn release(&mut self) {
        if let Some(mut v) = self.heap.take() {
            v.zeroize();
        }
        self.inline.as_mut_slice().zeroize();
        self.inline.clear();
    }

    fn spill(&mut self, additional: usize) {
        let mut v = Vec::with_capacity((self.inline.len() + additional).max(2 * N));
        v.extend_from_slice(&self.inline);
        self.inline.as_mut_slice().zeroize();
        self.inline.clear();
        self.heap = Some(v);
    }
}

impl<const N: usize> Default for OutputBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Drop for OutputBuffer<N> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<const N: usize> core::ops::Deref for OutputBuffer<N> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<const N: usize> core::fmt::Debug for OutputBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OutputBuffer({} bytes)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_inline_within_capacity() {
        let mut buf: OutputBuffer<16> = OutputBuffer::new();
        buf.extend_from_slice(b"0123456789abcdef");
        assert_eq!(buf.len(), 16);
        assert!(!buf.is_heap_backed());
        assert_eq!(buf.as_slice(), b"0123456789abcdef");
    }

    #[test]
    fn spills_to_heap_and_preserves_contents() {
        let mut buf: OutputBuffer<8> = OutputBuffer::new();
        buf.extend_from_slice(b"01234567");
        assert!(!buf.is_heap_backed());
        buf.push(b'8');
        assert!(buf.is_heap_backed());
        assert_eq!(buf.as_slice(), b"012345678");
    }

    #[test]
    fn reserve_spills_ahead_of_write() {
        let mut buf: OutputBuffer<8> = OutputBuffer::new();
        buf.extend_from_slice(b"0123");
        buf.reserve(100);
        assert!(buf.is_heap_backed());
        assert_eq!(buf.as_slice(), b"0123");
    }

    #[test]
    fn truncate_and_drain() {
        let mut buf: OutputBuffer<32> = OutputBuffer::new();
        buf.extend_from_slice(b"hello world");
        buf.truncate(5);
        assert_eq!(buf.as_slice(), b"hello");
        buf.drain_front(2);
        assert_eq!(buf.as_slice(), b"llo");
    }

    #[test]
    fn release_resets_to_inline() {
        let mut buf: OutputBuffer<4> = OutputBuffer::new();
        buf.extend_from_slice(b"spill me far past inline");
        assert!(buf.is_heap_backed());
        buf.release();
        assert!(buf.is_empty());
        assert!(!buf.is_heap_backed());
        buf.extend_from_slice(b"ok");
        assert_eq!(buf.as_slice(), b"ok");
    }
}
