//! The per-thread message endpoint

use std::sync::Arc;

use shoal_query::Bundle;

use crate::mesh::Mesh;

/// Non-blocking send/receive endpoint for one thread
///
/// `send` returning false means the destination is backpressured; callers
/// stash the bundle and retry on a later loop iteration. `try_recv` never
/// blocks — the engine's snooze policy decides when to sleep.
pub struct Adaptor {
    sid: usize,
    tid: usize,
    mesh: Arc<Mesh>,
}

impl Adaptor {
    pub(crate) fn new(sid: usize, tid: usize, mesh: Arc<Mesh>) -> Self {
        Self { sid, tid, mesh }
    }

    pub fn sid(&self) -> usize {
        self.sid
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    /// Non-blocking send; a backpressured bundle comes back in the `Err`
    /// so the caller can stash and retry it
    pub fn send(&self, dst_sid: usize, dst_tid: usize, bundle: Bundle) -> Result<(), Bundle> {
        self.mesh.send(dst_sid, dst_tid, bundle)
    }

    /// Non-blocking receive from this thread's own queue
    pub fn try_recv(&self) -> Option<Bundle> {
        self.mesh.try_recv(self.sid, self.tid)
    }
}
