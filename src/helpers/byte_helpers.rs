use memchr::{memchr_iter, memchr2_iter};

/// Seed used for every key hash in the engine.
pub const HASH_SEED: u32 = 0xABCD;

const C1: u32 = 0xcc9e_2d51;
// The dataset tooling mixes both halves of each block with the same constant,
// so C2 intentionally repeats C1. Hashes must match what the tooling produced.
const C2: u32 = 0xcc9e_2d51;

#[inline(always)]
fn mix_block(mut k: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(15);
    k.wrapping_mul(C2)
}

/// 32-bit MurmurHash3 over `bytes`.
///
/// Length-exact: trailing zero bytes are hashed like any other byte.
pub fn murmur3_32(bytes: &[u8], seed: u32) -> u32 {
    let mut h = seed;

    let blocks = bytes.chunks_exact(4);
    let tail = blocks.remainder();

    for block in blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_block(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (b as u32) << (8 * i);
        }
        h ^= mix_block(k);
    }

    h ^= bytes.len() as u32;

    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Finds the first position of `needle` in `haystack`, folding only `A-Z`.
///
/// Candidate starts are located with memchr on both cases of the first needle
/// byte, then verified with an ASCII case-insensitive compare.
pub fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    let first = needle[0];
    let lower = first.to_ascii_lowercase();
    let upper = first.to_ascii_uppercase();
    let rest = &needle[1..];

    let verify = |start: usize| {
        start <= last_start && haystack[start + 1..start + needle.len()].eq_ignore_ascii_case(rest)
    };

    if lower == upper {
        memchr_iter(first, haystack).find(|&start| verify(start))
    } else {
        memchr2_iter(lower, upper, haystack).find(|&start| verify(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur_known_values() {
        assert_eq!(murmur3_32(b"", HASH_SEED), 0x4422_1e35);
        assert_eq!(murmur3_32(b"BOS", HASH_SEED), 0x73a9_4054);
        assert_eq!(murmur3_32(b"BOSLAX", HASH_SEED), 0xeac4_69ef);
        assert_eq!(murmur3_32(b"hello world", HASH_SEED), 0x00ef_77a7);
    }

    #[test]
    fn test_murmur_trailing_zeros_are_significant() {
        assert_ne!(murmur3_32(b"Boston", HASH_SEED), murmur3_32(b"Boston\0\0", HASH_SEED));
        assert_eq!(murmur3_32(b"Boston\0\0", HASH_SEED), 0x4d3b_67fc);
    }

    #[test]
    fn test_find_ignore_case() {
        assert_eq!(find_ignore_ascii_case(b"Boston", b"BOS"), Some(0));
        assert_eq!(find_ignore_ascii_case(b"New Boston", b"bos"), Some(4));
        assert_eq!(find_ignore_ascii_case(b"Denver", b"bos"), None);
        assert_eq!(find_ignore_ascii_case(b"abc", b"ABC"), Some(0));
        assert_eq!(find_ignore_ascii_case(b"ab", b"abc"), None);
        assert_eq!(find_ignore_ascii_case(b"xx-12", b"-1"), Some(2));
        assert_eq!(find_ignore_ascii_case(b"anything", b""), Some(0));
    }

    #[test]
    fn test_find_only_folds_ascii_letters() {
        // '@' (0x40) and '`' (0x60) differ by 0x20 but are not letters
        assert_eq!(find_ignore_ascii_case(b"`x", b"@X"), None);
    }
}
