use std::sync::atomic::{AtomicU32, Ordering};

/// Fixed-size, word-addressed memory shared by every worker of a query.
///
/// All access goes through atomics, so concurrent writers to different
/// records never race. Multi-byte writes that only cover part of a word merge
/// into it with `fetch_and`/`fetch_or` and leave neighbouring bytes intact.
/// Cross-thread visibility of a finished record is established by whoever
/// publishes it (the hash table's release store, or the end of the scan).
#[derive(Debug)]
pub struct SharedRegion {
    words: Box<[AtomicU32]>,
    len: usize,
}

impl SharedRegion {
    pub fn new(len: usize) -> Self {
        let words = (0..len.div_ceil(4)).map(|_| AtomicU32::new(0)).collect();
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn word(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset % 4 == 0, "unaligned word access at {offset}");
        &self.words[offset / 4]
    }

    #[inline]
    pub fn load_u32(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store_u32(&self, offset: usize, value: u32) {
        self.word(offset).store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load_f32(&self, offset: usize) -> f32 {
        f32::from_bits(self.load_u32(offset))
    }

    #[inline]
    pub fn store_f32(&self, offset: usize, value: f32) {
        self.store_u32(offset, value.to_bits());
    }

    /// Wrapping atomic add; returns the previous value.
    #[inline]
    pub fn fetch_add_u32(&self, offset: usize, value: u32) -> u32 {
        self.word(offset).fetch_add(value, Ordering::Relaxed)
    }

    /// Writes `bytes` at any byte offset.
    pub fn store_bytes(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len, "region write out of bounds");

        let mut pos = offset;
        let mut src = bytes;
        while !src.is_empty() {
            let word_start = pos & !3;
            let lane = pos - word_start;
            let n = (4 - lane).min(src.len());
            let word = &self.words[word_start / 4];

            if n == 4 {
                word.store(
                    u32::from_le_bytes([src[0], src[1], src[2], src[3]]),
                    Ordering::Relaxed,
                );
            } else {
                let mut mask = [0u8; 4];
                let mut value = [0u8; 4];
                mask[lane..lane + n].fill(0xff);
                value[lane..lane + n].copy_from_slice(&src[..n]);
                let mask = u32::from_le_bytes(mask);
                word.fetch_and(!mask, Ordering::Relaxed);
                word.fetch_or(u32::from_le_bytes(value), Ordering::Relaxed);
            }

            pos += n;
            src = &src[n..];
        }
    }

    /// Copies `out.len()` bytes starting at `offset` into `out`.
    pub fn load_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.len, "region read out of bounds");
        for (i, b) in out.iter_mut().enumerate() {
            let pos = offset + i;
            let word = self.words[pos / 4].load(Ordering::Relaxed).to_le_bytes();
            *b = word[pos % 4];
        }
    }

    /// Compares the bytes at `offset` with `expected` without copying them out.
    pub fn bytes_eq(&self, offset: usize, expected: &[u8]) -> bool {
        if offset + expected.len() > self.len {
            return false;
        }
        let mut pos = offset;
        for part in expected.chunks(4) {
            let word = self.words[pos / 4].load(Ordering::Relaxed).to_le_bytes();
            let lane = pos % 4;
            let n = part.len().min(4 - lane);
            if word[lane..lane + n] != part[..n] {
                return false;
            }
            if n < part.len() {
                let next = self.words[pos / 4 + 1].load(Ordering::Relaxed).to_le_bytes();
                if next[..part.len() - n] != part[n..] {
                    return false;
                }
            }
            pos += part.len();
        }
        true
    }

    /// Snapshot of the first `len` bytes.
    pub fn to_bytes(&self, len: usize) -> Vec<u8> {
        let len = len.min(self.len);
        let mut out = Vec::with_capacity(len.next_multiple_of(4));
        for word in &self.words[..len.div_ceil(4)] {
            out.extend_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        out.truncate(len);
        out
    }
}

/// Write access to a freshly allocated record, handed to insert callbacks.
///
/// Only the thread that won the record's allocation holds one.
pub struct RowInit<'r> {
    region: &'r SharedRegion,
    base: usize,
}

impl<'r> RowInit<'r> {
    pub(crate) fn new(region: &'r SharedRegion, base: usize) -> Self {
        Self { region, base }
    }

    pub fn put_u32(&mut self, field: usize, value: u32) {
        self.region.store_u32(self.base + field, value);
    }

    pub fn put_f32(&mut self, field: usize, value: f32) {
        self.region.store_f32(self.base + field, value);
    }

    pub fn put_bytes(&mut self, field: usize, bytes: &[u8]) {
        self.region.store_bytes(self.base + field, bytes);
    }
}

/// Accumulating access to a published record, handed to update callbacks.
///
/// Exposes atomic adds only; a record's key bytes are never rewritten.
pub struct RowAccumulator<'r> {
    region: &'r SharedRegion,
    base: usize,
}

impl<'r> RowAccumulator<'r> {
    pub(crate) fn new(region: &'r SharedRegion, base: usize) -> Self {
        Self { region, base }
    }

    pub fn add_u32(&self, field: usize, value: u32) -> u32 {
        self.region.fetch_add_u32(self.base + field, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaligned_bytes_keep_neighbours() {
        let region = SharedRegion::new(12);
        region.store_bytes(0, b"BOSLAX");
        region.store_bytes(6, b"zz");
        region.store_u32(8, 7);
        let bytes = region.to_bytes(12);
        assert_eq!(&bytes[..8], b"BOSLAXzz");
        assert_eq!(region.load_u32(8), 7);

        let mut out = [0u8; 3];
        region.load_bytes(3, &mut out);
        assert_eq!(&out, b"LAX");

        assert!(region.bytes_eq(0, b"BOSLAX"));
        assert!(region.bytes_eq(3, b"LAXzz"));
        assert!(!region.bytes_eq(0, b"BOSLAY"));
        assert!(!region.bytes_eq(10, b"abc"));
    }

    #[test]
    fn test_concurrent_adds_are_exact() {
        let region = SharedRegion::new(8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let acc = RowAccumulator::new(&region, 4);
                    for _ in 0..1000 {
                        acc.add_u32(0, 1);
                    }
                });
            }
        });
        assert_eq!(region.load_u32(4), 8000);
        assert_eq!(region.load_u32(0), 0);
    }

    #[test]
    fn test_row_init_writes_typed_fields() {
        let region = SharedRegion::new(24);
        let mut init = RowInit::new(&region, 8);
        init.put_f32(0, -71.5);
        init.put_u32(4, 3);
        init.put_bytes(8, b"ab");
        assert_eq!(region.load_f32(8), -71.5);
        assert_eq!(region.load_u32(12), 3);
        assert_eq!(&region.to_bytes(18)[16..], b"ab");
    }

    #[test]
    fn test_to_bytes_truncates_to_length() {
        let region = SharedRegion::new(6);
        region.store_bytes(0, b"abcdef");
        assert_eq!(region.to_bytes(100), b"abcdef");
    }
}
