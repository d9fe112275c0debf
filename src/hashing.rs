//! The external, non-cryptographic hash collaborator named but left
//! unspecified by §1 ("the hash function is assumed given"). The reference
//! implementation links `MurmurHash3_x64_128` for its own `hll_hash_*`
//! family of functions (`original_source/hll.c`), so this module ships the
//! same algorithm rather than inventing a different one: any embedder of
//! this crate can still supply its own 64-bit hash to `Hll::add_raw`
//! directly, but the `hash_*` operations in §6 need a concrete
//! implementation to exist at all.

/// MurmurHash3_x64_128, returning the full 128-bit digest as two u64 words
/// `[h1, h2]` (the reference implementation's `out[0]`, `out[1]`).
pub fn murmur3_x64_128(data: &[u8], seed: i64) -> [u64; 2] {
    if seed < 0 {
        log::warn!("negative seed values not compatible with the reference implementation");
    }

    const C1: u64 = 0x87c3_7b91_1142_53d5;
    const C2: u64 = 0x4cf5_ad43_2745_937f;

    let mut h1: u64 = seed as u64;
    let mut h2: u64 = seed as u64;

    let nblocks = data.len() / 16;
    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    if tail.len() > 8 {
        for (i, b) in tail[8..].iter().enumerate() {
            k2 ^= (*b as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        for (i, b) in tail[..tail.len().min(8)].iter().enumerate() {
            k1 ^= (*b as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    [h1, h2]
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

/// Low 64 bits of the 128-bit digest, the value the reference
/// implementation's `hll_hash_*` SQL functions return (`out[0]`).
pub fn low64(data: &[u8], seed: i64) -> i64 {
    murmur3_x64_128(data, seed)[0] as i64
}

pub fn hash_i16(value: i16, seed: i64) -> i64 {
    low64(&value.to_le_bytes(), seed)
}

pub fn hash_i32(value: i32, seed: i64) -> i64 {
    low64(&value.to_le_bytes(), seed)
}

pub fn hash_i64(value: i64, seed: i64) -> i64 {
    low64(&value.to_le_bytes(), seed)
}

pub fn hash_bytes(value: &[u8], seed: i64) -> i64 {
    low64(value, seed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        assert_eq!(hash_bytes(b"hello world", 0), hash_bytes(b"hello world", 0));
    }

    #[test]
    fn differs_by_seed() {
        assert_ne!(hash_bytes(b"hello world", 0), hash_bytes(b"hello world", 1));
    }

    #[test]
    fn differs_by_content() {
        assert_ne!(hash_bytes(b"hello world", 0), hash_bytes(b"hello there", 0));
    }

    #[test]
    fn typed_wrappers_are_stable() {
        assert_eq!(hash_i64(123456789, 0), hash_i64(123456789, 0));
        assert_ne!(hash_i32(1, 0), hash_i32(2, 0));
    }

    #[test]
    fn empty_input_does_not_panic() {
        let _ = hash_bytes(b"", 0);
    }

    #[test]
    fn negative_seed_does_not_panic() {
        let _ = hash_bytes(b"x", -1);
    }
}
