//! Write-set bloom filter
//!
//! Each read-write transaction carries one filter that answers "did this
//! transaction possibly write this address?". A negative answer is exact and
//! lets reads and writes skip scanning the write-set; a positive answer is
//! confirmed by a linear scan.
//!
//! Bit positions use double hashing over one 64-bit xxh3 digest:
//! `pos_i = h1 + i * h2 (mod m)`.

use tl2_core::{Address, Error, Result};
use xxhash_rust::xxh3::xxh3_64;

/// Fixed-size bloom filter over addresses
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

impl BloomFilter {
    /// Create an empty filter
    ///
    /// `num_bits` is rounded up to a multiple of 64. Fails only if the bit
    /// array cannot be allocated.
    pub fn new(num_bits: usize, num_hashes: u32) -> Result<Self> {
        let words = (num_bits.max(1) + 63) / 64;
        let mut bits = Vec::new();
        bits.try_reserve_exact(words)
            .map_err(|_| Error::OutOfMemory {
                requested: words * 8,
            })?;
        bits.resize(words, 0);
        Ok(Self {
            bits,
            num_bits: words * 64,
            num_hashes: num_hashes.max(1),
        })
    }

    /// Number of bits in the filter
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of probes per operation
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    #[inline]
    fn hashes(address: Address) -> (u64, u64) {
        let mut key = [0u8; 12];
        key[..4].copy_from_slice(&address.segment().get().to_le_bytes());
        key[4..].copy_from_slice(&address.offset().to_le_bytes());
        let digest = xxh3_64(&key);
        (digest & 0xffff_ffff, (digest >> 32) | 1)
    }

    #[inline]
    fn probe(&self, h1: u64, h2: u64, i: u32) -> usize {
        (h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits as u64) as usize
    }

    /// Mark an address as present
    #[inline]
    pub fn insert(&mut self, address: Address) {
        let (h1, h2) = Self::hashes(address);
        for i in 0..self.num_hashes {
            let pos = self.probe(h1, h2, i);
            self.bits[pos / 64] |= 1u64 << (pos % 64);
        }
    }

    /// Test membership: `false` means definitely absent
    #[inline]
    pub fn may_contain(&self, address: Address) -> bool {
        let (h1, h2) = Self::hashes(address);
        (0..self.num_hashes).all(|i| {
            let pos = self.probe(h1, h2, i);
            self.bits[pos / 64] & (1u64 << (pos % 64)) != 0
        })
    }

    /// Remove every element
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}
