//! The word arena
//!
//! A flat array of atomic 64-bit words. Readers use acquire loads, writers
//! release stores; a slot's value word is always published before its key
//! word, so a reader that observes a key observes its value.
//!
//! The same arena doubles as the loader's staging area before the store is
//! initialized, which is why raw word read/write is public: exchange-load
//! writes triples into a peer's arena through the one-sided transport.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Flat array of atomic words
pub struct Arena {
    words: Vec<AtomicU64>,
}

impl Arena {
    /// Allocate a zeroed arena of `len` words
    pub fn new(len: usize) -> Self {
        let mut words = Vec::with_capacity(len);
        words.resize_with(len, || AtomicU64::new(0));
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Acquire-load one word
    pub fn load(&self, idx: u64) -> u64 {
        self.words[idx as usize].load(Ordering::Acquire)
    }

    /// Release-store one word
    pub fn store(&self, idx: u64, val: u64) {
        self.words[idx as usize].store(val, Ordering::Release);
    }

    /// Atomic add, returning the previous value
    pub fn fetch_add(&self, idx: u64, val: u64) -> u64 {
        self.words[idx as usize].fetch_add(val, Ordering::AcqRel)
    }

    /// Copy `n` words starting at `off` into `out` (cleared first)
    pub fn read_into(&self, off: u64, n: usize, out: &mut Vec<u64>) -> Result<()> {
        let start = off as usize;
        let end = start
            .checked_add(n)
            .ok_or_else(|| Error::corrupt("arena read overflow"))?;
        if end > self.words.len() {
            return Err(Error::corrupt(format!(
                "arena read [{start}, {end}) out of bounds (len {})",
                self.words.len()
            )));
        }
        out.clear();
        out.extend(self.words[start..end].iter().map(|w| w.load(Ordering::Acquire)));
        Ok(())
    }

    /// Store a slice of words starting at `off`
    pub fn write_slice(&self, off: u64, data: &[u64]) -> Result<()> {
        let start = off as usize;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| Error::corrupt("arena write overflow"))?;
        if end > self.words.len() {
            return Err(Error::corrupt(format!(
                "arena write [{start}, {end}) out of bounds (len {})",
                self.words.len()
            )));
        }
        for (w, &v) in self.words[start..end].iter().zip(data) {
            w.store(v, Ordering::Release);
        }
        Ok(())
    }
}
