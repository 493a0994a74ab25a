// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stable 32-bit hashing used for pass and material identity.
//!
//! The hashes produced here are sort keys and deduplication keys, so they must be
//! identical across runs and platforms. `std::hash` offers no such guarantee, hence the
//! explicit MurmurHash2 implementation.

const M: u32 = 0x5bd1_e995;

/// MurmurHash2 (32-bit, "gc" variant) of `data` with the given `seed`.
pub fn murmurhash2_32_gc(data: &[u8], seed: u32) -> u32 {
    let mut len = data.len();
    let mut h = seed ^ (len as u32);
    let mut chunks = data.chunks_exact(4);

    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> 24;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M) ^ k;
        len -= 4;
    }

    let tail = chunks.remainder();
    if len >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if len >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if len >= 1 {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Accumulates heterogeneous values into a byte string and hashes it once.
///
/// Every value is written with a fixed-width little-endian encoding, strings are
/// length-prefixed, so two different sequences of writes never produce the same bytes.
#[derive(Debug, Default, Clone)]
pub struct HashWriter {
    bytes: Vec<u8>,
}

impl HashWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `u32`.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends a `u64`.
    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends an `f32` by its bit pattern.
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.write_u32(value.to_bits())
    }

    /// Appends a `bool`.
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.bytes.push(u8::from(value));
        self
    }

    /// Appends a length-prefixed string.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_u32(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
        self
    }

    /// Appends raw bytes, length-prefixed.
    pub fn write_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.write_u32(value.len() as u32);
        self.bytes.extend_from_slice(value);
        self
    }

    /// Hashes everything written so far.
    pub fn finish(&self, seed: u32) -> u32 {
        murmurhash2_32_gc(&self.bytes, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur_is_deterministic_and_seed_sensitive() {
        let a = murmurhash2_32_gc(b"forward-pass", 666);
        let b = murmurhash2_32_gc(b"forward-pass", 666);
        let c = murmurhash2_32_gc(b"forward-pass", 667);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn murmur_handles_every_tail_length() {
        let data = b"abcdefg";
        let hashes: Vec<u32> = (0..=data.len())
            .map(|n| murmurhash2_32_gc(&data[..n], 0))
            .collect();
        for (i, h) in hashes.iter().enumerate() {
            for other in &hashes[i + 1..] {
                assert_ne!(h, other);
            }
        }
    }

    #[test]
    fn empty_input_with_zero_seed_hashes_to_zero() {
        assert_eq!(murmurhash2_32_gc(&[], 0), 0);
    }

    #[test]
    fn hash_writer_separates_strings() {
        let mut a = HashWriter::new();
        a.write_str("ab").write_str("c");
        let mut b = HashWriter::new();
        b.write_str("a").write_str("bc");
        assert_ne!(a.finish(0), b.finish(0));
    }
}
