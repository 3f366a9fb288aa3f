//! Versioned segments
//!
//! A [`Segment`] is one contiguous allocation of `size` bytes, split into
//! `size / align` words. Every word has a lock bit and a version number:
//!
//! - The lock bit is set only between a committer's successful acquisition
//!   and its write-back, and is acquired with a single compare-and-set.
//! - The version is written only by the holder of the lock, and never
//!   decreases.
//!
//! All three arrays are atomics, so concurrent readers may copy a word while
//! a committer is writing it back without any `unsafe`. Such torn copies are
//! detected by the caller re-checking the lock bit and version afterwards.
//!
//! # Memory ordering
//!
//! Write-back stores bytes, then the version, then clears the lock, all with
//! `Release`. Readers load with `Acquire` in the opposite order (version,
//! bytes, lock, version). A reader that observes any byte of a write-back
//! therefore also observes either the lock still held or the new version.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use tl2_core::{Error, Result, Version};

/// One contiguous, word-versioned allocation
pub struct Segment {
    align: usize,
    data: Box<[AtomicU8]>,
    locks: Box<[AtomicBool]>,
    versions: Box<[AtomicU64]>,
}

fn try_boxed<T>(len: usize, elem_size: usize, init: impl Fn() -> T) -> Result<Box<[T]>> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
        requested: len.saturating_mul(elem_size),
    })?;
    v.extend((0..len).map(|_| init()));
    Ok(v.into_boxed_slice())
}

impl Segment {
    /// Allocate a zero-filled segment with all locks clear and versions 0
    ///
    /// `size` must already be validated as a positive multiple of `align`.
    /// Fails with [`Error::OutOfMemory`] if any of the three arrays cannot be
    /// allocated; nothing is leaked in that case.
    pub fn new(size: usize, align: usize) -> Result<Self> {
        let words = size / align;
        let data = try_boxed(size, 1, || AtomicU8::new(0))?;
        let locks = try_boxed(words, 1, || AtomicBool::new(false))?;
        let versions = try_boxed(words, 8, || AtomicU64::new(0))?;
        Ok(Self {
            align,
            data,
            locks,
            versions,
        })
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Word size in bytes
    pub fn align(&self) -> usize {
        self.align
    }

    /// Number of words
    pub fn word_count(&self) -> usize {
        self.versions.len()
    }

    /// Current version of a word
    #[inline]
    pub fn version(&self, word: usize) -> Version {
        self.versions[word].load(Ordering::Acquire)
    }

    /// Whether a word's lock bit is set
    #[inline]
    pub fn is_locked(&self, word: usize) -> bool {
        self.locks[word].load(Ordering::Acquire)
    }

    /// Try to take a word's lock with one compare-and-set
    ///
    /// Never spins: a held lock returns `false` immediately.
    #[inline]
    pub fn try_lock(&self, word: usize) -> bool {
        self.locks[word]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Clear a word's lock bit without publishing anything
    #[inline]
    pub fn unlock(&self, word: usize) {
        self.locks[word].store(false, Ordering::Release);
    }

    /// Copy a word's current bytes into `out`
    ///
    /// `out` must be exactly one word long. The copy may be torn if a
    /// committer is writing the word concurrently.
    #[inline]
    pub fn load_word(&self, word: usize, out: &mut [u8]) {
        let start = word * self.align;
        for (dst, src) in out.iter_mut().zip(&self.data[start..start + self.align]) {
            *dst = src.load(Ordering::Acquire);
        }
    }

    /// Write back a locked word: store bytes, stamp `version`, clear the lock
    ///
    /// The caller must hold the word's lock.
    #[inline]
    pub fn publish(&self, word: usize, value: &[u8], version: Version) {
        debug_assert!(self.is_locked(word));
        let start = word * self.align;
        for (dst, src) in self.data[start..start + self.align].iter().zip(value) {
            dst.store(*src, Ordering::Release);
        }
        self.versions[word].store(version, Ordering::Release);
        self.locks[word].store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("size", &self.size())
            .field("align", &self.align)
            .field("word_count", &self.word_count())
            .finish()
    }
}
