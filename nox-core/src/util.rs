//! Stateless helpers exposed to guests: LZ4 compression and xxh3 hashing.

use crate::error::{NoxError, Result};

/// LZ4 block with the uncompressed size prepended.
pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data).map_err(|e| NoxError::Decode(e.to_string()))
}

pub fn hash(data: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(data)
}

/// Milliseconds elapsed since `start`, saturating.
pub fn millis_since(start: std::time::Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}
