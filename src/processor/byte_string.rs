use std::fmt;

use crate::helpers::byte_helpers::{HASH_SEED, find_ignore_ascii_case, murmur3_32};

/// A bounded, length-exact view over bytes owned elsewhere.
///
/// The view never owns or grows its memory. Hot loops keep one instance per
/// column and [`rebind`](Self::rebind) it to each row instead of allocating.
/// Zero bytes inside the range are content, not terminators.
#[derive(Clone, Copy, Default)]
pub struct FixedByteBuffer<'a> {
    bytes: &'a [u8],
}

impl<'a> FixedByteBuffer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Repoints the view at `buffer[start..end]` without copying.
    #[inline]
    pub fn rebind(&mut self, buffer: &'a [u8], start: usize, end: usize) {
        self.bytes = &buffer[start..end];
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn equals(&self, other: &FixedByteBuffer<'_>) -> bool {
        self.bytes == other.bytes
    }

    /// Equality with `A-Z` folded to lowercase; other bytes compare exactly.
    #[inline]
    pub fn equals_case_insensitive(&self, other: &FixedByteBuffer<'_>) -> bool {
        self.bytes.eq_ignore_ascii_case(other.bytes)
    }

    /// Case-insensitive substring search. An empty needle always matches.
    #[inline]
    pub fn contains_case_insensitive(&self, needle: &FixedByteBuffer<'_>) -> bool {
        find_ignore_ascii_case(self.bytes, needle.bytes).is_some()
    }

    #[inline]
    pub fn hash(&self) -> u32 {
        murmur3_32(self.bytes, HASH_SEED)
    }

    /// Lossy text with the zero padding of a fixed-width slot stripped.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(super::trim_padding(self.bytes)).into_owned()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl PartialEq for FixedByteBuffer<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for FixedByteBuffer<'_> {}

impl fmt::Debug for FixedByteBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedByteBuffer({:?})", String::from_utf8_lossy(self.bytes))
    }
}

/// Writable counterpart of [`FixedByteBuffer`], used to fill a key slot once.
pub struct FixedByteBufferMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> FixedByteBufferMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies `other` byte-for-byte into this slot.
    ///
    /// The slot must be at least as long as `other`; any remaining bytes of
    /// the slot are zeroed.
    pub fn copy_from(&mut self, other: &FixedByteBuffer<'_>) {
        let n = other.len();
        assert!(n <= self.bytes.len(), "key slot too small");
        self.bytes[..n].copy_from_slice(other.as_bytes());
        self.bytes[n..].fill(0);
    }

    pub fn as_view(&self) -> FixedByteBuffer<'_> {
        FixedByteBuffer::new(self.bytes)
    }
}
