//! # Membership filter
//!
//! A Bloom-style probabilistic set over record keys, embedded in every
//! partition node. The filter can say with certainty that a key is **not**
//! in a partition (no false negatives) but may occasionally say a key **is**
//! present when it isn't. Point and batch reads consult the filter first and
//! skip tablet loads for keys it rules out.
//!
//! Filters are sized from the partition `limit` and a target false-positive
//! rate, not from the actual record count, so every partition built with the
//! same parameters serializes to the same shape. Serialization is fully
//! deterministic: two filters holding the same keys produce identical bytes,
//! which keeps partition nodes content-addressable.
//!
//! ## Example
//!
//! ```rust
//! use bloom::MembershipFilter;
//!
//! let mut filter = MembershipFilter::new(1000, 0.01);
//! filter.insert(b"some-key");
//! assert!(filter.may_contain(b"some-key"));
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Bit-vector filter with `k` hash probes per key.
///
/// Probes use double hashing, `h(i) = h1 + i * h2`, with `h1` and `h2`
/// derived from FNV-1a under two different bases.
#[derive(Clone, PartialEq, Eq)]
pub struct MembershipFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl MembershipFilter {
    /// Creates a filter sized for `capacity` keys at the given target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or `false_positive_rate` is not in `(0, 1)`.
    #[must_use]
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m/n) * ln(2)
        let n = capacity as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let m = m.max(8);
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        Self {
            bits: vec![0u8; ((m + 7) / 8) as usize],
            num_bits: m,
            num_hashes: k,
        }
    }

    /// Marks a key as present.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.probe(h1, h2, i);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `true` if the key **might** be present, `false` if it is
    /// **definitely not** present.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.probe(h1, h2, i);
            if self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    /// Number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash probes per key.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Serializes the filter.
    ///
    /// Wire format (little-endian):
    /// ```text
    /// [num_bits: u64][num_hashes: u32][bits_len: u32][bits: bytes]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.num_bits)?;
        w.write_u32::<LittleEndian>(self.num_hashes)?;
        w.write_u32::<LittleEndian>(self.bits.len() as u32)?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter previously written with [`write_to`].
    ///
    /// [`write_to`]: MembershipFilter::write_to
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let num_bits = r.read_u64::<LittleEndian>()?;
        let num_hashes = r.read_u32::<LittleEndian>()?;
        let bits_len = r.read_u32::<LittleEndian>()? as usize;

        // A filter larger than this is a decoding bug, not a real filter.
        const MAX_FILTER_BYTES: usize = 64 * 1024 * 1024;
        if bits_len > MAX_FILTER_BYTES || (bits_len as u64) * 8 < num_bits {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible filter length: {bits_len} bytes for {num_bits} bits"),
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;
        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    /// h(i) = (h1 + i * h2) mod num_bits.
    fn probe(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for MembershipFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Two independent 64-bit FNV-1a hashes under different bases.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (
        fnv1a_64(key, 0xcbf2_9ce4_8422_2325),
        fnv1a_64(key, 0x517c_c1b7_2722_0a95),
    )
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
