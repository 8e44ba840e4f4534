//! Shared-memory one-sided fabric
//!
//! In-process stand-in for RDMA verbs: word reads and writes go straight
//! to the target server's arena. The `tid` parameter exists for
//! implementations with per-thread scratch registration; here it is
//! unused.

use std::sync::Arc;

use shoal_store::{Arena, RemoteMem, Result};

/// One-sided access to every server's arena in this process
pub struct SharedMem {
    arenas: Vec<Arc<Arena>>,
}

impl SharedMem {
    pub fn new(arenas: Vec<Arc<Arena>>) -> Arc<Self> {
        Arc::new(Self { arenas })
    }
}

impl RemoteMem for SharedMem {
    fn read(&self, _tid: usize, dst_sid: usize, word_off: u64, n: usize, out: &mut Vec<u64>) -> Result<()> {
        self.arenas[dst_sid].read_into(word_off, n, out)
    }

    fn write(&self, _tid: usize, dst_sid: usize, word_off: u64, data: &[u64]) -> Result<()> {
        self.arenas[dst_sid].write_slice(word_off, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_arena_words() {
        let arenas = vec![Arc::new(Arena::new(16)), Arc::new(Arena::new(16))];
        let shm = SharedMem::new(arenas.clone());
        shm.write(0, 1, 4, &[7, 8]).unwrap();
        let mut out = Vec::new();
        shm.read(0, 1, 4, 2, &mut out).unwrap();
        assert_eq!(out, vec![7, 8]);
        // server 0 untouched
        shm.read(0, 0, 4, 2, &mut out).unwrap();
        assert_eq!(out, vec![0, 0]);
    }
}
