//! In-process bounded-channel mesh
//!
//! One bounded channel per `(server, thread)` endpoint. A full channel
//! makes `send` return false, which is the backpressure signal the
//! engine's pending-message stash handles.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use shoal_core::ClusterConfig;
use shoal_query::Bundle;

use crate::adaptor::Adaptor;

/// Default per-endpoint queue depth
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// All channels of a single-process cluster
pub struct Mesh {
    cfg: Arc<ClusterConfig>,
    senders: Vec<Sender<Bundle>>,
    receivers: Vec<Receiver<Bundle>>,
}

impl Mesh {
    pub fn new(cfg: Arc<ClusterConfig>) -> Arc<Self> {
        Self::with_capacity(cfg, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Build with an explicit queue depth (tests use small depths to
    /// exercise backpressure)
    pub fn with_capacity(cfg: Arc<ClusterConfig>, capacity: usize) -> Arc<Self> {
        let endpoints = cfg.num_servers * cfg.num_threads();
        let mut senders = Vec::with_capacity(endpoints);
        let mut receivers = Vec::with_capacity(endpoints);
        for _ in 0..endpoints {
            let (tx, rx) = bounded(capacity);
            senders.push(tx);
            receivers.push(rx);
        }
        Arc::new(Self { cfg, senders, receivers })
    }

    fn idx(&self, sid: usize, tid: usize) -> usize {
        sid * self.cfg.num_threads() + tid
    }

    /// The endpoint for thread `tid` on server `sid`
    pub fn adaptor(self: &Arc<Self>, sid: usize, tid: usize) -> Adaptor {
        Adaptor::new(sid, tid, Arc::clone(self))
    }

    pub(crate) fn send(&self, dst_sid: usize, dst_tid: usize, bundle: Bundle) -> Result<(), Bundle> {
        match self.senders[self.idx(dst_sid, dst_tid)].try_send(bundle) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(b)) | Err(TrySendError::Disconnected(b)) => Err(b),
        }
    }

    pub(crate) fn try_recv(&self, sid: usize, tid: usize) -> Option<Bundle> {
        self.receivers[self.idx(sid, tid)].try_recv().ok()
    }
}
