//! Jump consistent hashing.
//!
//! Maps a 64-bit key onto `n` buckets without any lookup table. Growing the
//! bucket count from `n` to `n + 1` moves roughly `1 / (n + 1)` of the keys,
//! and every moved key lands in the new bucket.

use std::sync::Arc;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Pluggable `(bucket_count, key_material) -> index` function.
pub type HashFn = Arc<dyn Fn(usize, &[&str]) -> usize + Send + Sync>;

/// Bucket for `key` among `num_buckets` buckets.
///
/// Returns 0 when `num_buckets` is 0 or 1.
pub fn jump_consistent_hash(mut key: u64, num_buckets: usize) -> usize {
    let num_buckets = num_buckets as i64;
    let mut b: i64 = -1;
    let mut j: i64 = 0;

    while j < num_buckets {
        b = j;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1i64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }

    b.max(0) as usize
}

/// FNV-1a over the key parts, each prefixed with `/`.
pub fn hash_key(parts: &[&str]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for part in parts {
        for byte in b"/".iter().chain(part.as_bytes()) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Default hash function: FNV-1a key reduction then jump hash.
pub fn jump_hash(num_buckets: usize, parts: &[&str]) -> usize {
    jump_consistent_hash(hash_key(parts), num_buckets)
}

pub fn default_hash_fn() -> HashFn {
    Arc::new(jump_hash)
}
