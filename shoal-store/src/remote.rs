//! One-sided remote memory access
//!
//! [`RemoteMem`] is the seam between the store and the transport fabric:
//! word-granular reads and writes against a peer's arena, addressed by the
//! shared geometry. Implementations may be RDMA verbs, a TCP emulation, or
//! the in-process mesh used by tests and single-machine deployments.
//!
//! Each engine thread owns a [`ThreadScratch`]: the landing buffers for
//! remote reads. A fetched edge list stays valid in the scratch until the
//! same thread performs its next remote read, which mirrors how a real
//! one-sided read reuses the thread's registered buffer on the peer.

use crate::error::Result;

/// Word-granular one-sided access to peers' arenas
pub trait RemoteMem: Send + Sync {
    /// Read `n` words at `word_off` of `dst_sid`'s arena into `out`
    ///
    /// `tid` identifies the calling thread so implementations can use its
    /// per-peer scratch region.
    fn read(&self, tid: usize, dst_sid: usize, word_off: u64, n: usize, out: &mut Vec<u64>) -> Result<()>;

    /// Write `data` at `word_off` of `dst_sid`'s arena
    fn write(&self, tid: usize, dst_sid: usize, word_off: u64, data: &[u64]) -> Result<()>;
}

/// Per-thread landing buffers for the remote fetch protocol
pub struct ThreadScratch {
    /// Global thread ID of the owner
    pub tid: usize,
    /// Bucket words from the most recent remote bucket read
    pub bucket: Vec<u64>,
    /// Payload words from the most recent remote list read
    pub payload: Vec<u64>,
}

impl ThreadScratch {
    pub fn new(tid: usize) -> Self {
        Self {
            tid,
            bucket: Vec::new(),
            payload: Vec::new(),
        }
    }
}
