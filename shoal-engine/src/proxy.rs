//! The client-facing proxy
//!
//! A proxy assigns the query its ID, routes it to an engine — the owner of
//! a constant first subject, any local engine for index starts — and waits
//! for the final reply. One query is outstanding per proxy at a time; the
//! parser and REPL in front of it are out of scope here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use shoal_core::{hash_mod, ClusterConfig, Vid};
use shoal_net::Adaptor;
use shoal_query::{Bundle, Coder, GStoreCheckReq, QueryKind, RdfLoadReq, SparqlQuery};

use crate::error::{Error, Result};

/// One proxy thread's endpoint
pub struct Proxy {
    sid: usize,
    tid: usize,
    cfg: Arc<ClusterConfig>,
    adaptor: Adaptor,
    coder: Mutex<Coder>,
    next_engine: AtomicUsize,
}

impl Proxy {
    pub fn new(sid: usize, tid: usize, cfg: Arc<ClusterConfig>, adaptor: Adaptor) -> Self {
        Self {
            sid,
            tid,
            cfg,
            adaptor,
            coder: Mutex::new(Coder::new(sid, tid)),
            next_engine: AtomicUsize::new(0),
        }
    }

    pub fn sid(&self) -> usize {
        self.sid
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    fn pick_engine_tid(&self) -> usize {
        let n = self.next_engine.fetch_add(1, Ordering::AcqRel);
        self.cfg.engine_tid_base() + n % self.cfg.num_engines
    }

    /// Destination for a fresh query: the owner shard of a constant first
    /// subject, this server otherwise
    fn route(&self, q: &SparqlQuery) -> (usize, usize) {
        let dst_tid = self.pick_engine_tid();
        if q.start_from_index() {
            return (self.sid, dst_tid);
        }
        let dst_sid = q
            .pattern_group
            .patterns
            .first()
            .filter(|p| p.subject > 0)
            .map(|p| hash_mod(p.subject as Vid, self.cfg.num_servers))
            .unwrap_or(self.sid);
        (dst_sid, dst_tid)
    }

    /// Execute a parsed query and wait for its final result
    pub fn run_query(&self, mut query: SparqlQuery, timeout: Duration) -> Result<SparqlQuery> {
        let qid = self.coder.lock().next_qid();
        query.id = qid;
        query.pid = qid;
        query.kind = QueryKind::Request;

        let (dst_sid, dst_tid) = self.route(&query);
        debug!(sid = self.sid, qid, dst_sid, dst_tid, "dispatching query");
        self.send_with_deadline(Bundle::Sparql(query), dst_sid, dst_tid, timeout)?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(Bundle::Sparql(reply)) = self.try_recv_any() {
                if reply.pid == qid {
                    return Ok(reply);
                }
                debug!(sid = self.sid, pid = reply.pid, "dropping stale reply");
            }
            if Instant::now() > deadline {
                return Err(Error::timeout(format!("query {qid} got no reply")));
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    /// Run an incremental load on every server and sum the insert counts
    pub fn run_dynamic_load(&self, dname: &str, check_dup: bool, timeout: Duration) -> Result<i64> {
        let mut total = 0;
        for sid in 0..self.cfg.num_servers {
            let mut req = RdfLoadReq::new(dname, check_dup);
            let qid = self.coder.lock().next_qid();
            req.id = qid;
            req.pid = qid;
            self.send_with_deadline(
                Bundle::DynamicLoad(req),
                sid,
                self.cfg.engine_tid_base(),
                timeout,
            )?;
            let reply = self.wait_for(timeout, |b| match b {
                Bundle::DynamicLoad(r) if r.pid == qid => Some(r.load_ret),
                _ => None,
            })?;
            total += reply;
        }
        Ok(total)
    }

    /// Run the store self-check on every server and sum the error counts
    pub fn run_gstore_check(
        &self,
        index_check: bool,
        normal_check: bool,
        timeout: Duration,
    ) -> Result<i64> {
        let mut total = 0;
        for sid in 0..self.cfg.num_servers {
            let mut req = GStoreCheckReq::new(index_check, normal_check);
            let qid = self.coder.lock().next_qid();
            req.id = qid;
            req.pid = qid;
            self.send_with_deadline(
                Bundle::GStoreCheck(req),
                sid,
                self.cfg.engine_tid_base(),
                timeout,
            )?;
            let reply = self.wait_for(timeout, |b| match b {
                Bundle::GStoreCheck(r) if r.pid == qid => Some(r.check_ret),
                _ => None,
            })?;
            total += reply;
        }
        Ok(total)
    }

    fn send_with_deadline(
        &self,
        bundle: Bundle,
        dst_sid: usize,
        dst_tid: usize,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut bundle = bundle;
        loop {
            match self.adaptor.send(dst_sid, dst_tid, bundle) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    if Instant::now() > deadline {
                        return Err(Error::timeout("engine queue stayed full"));
                    }
                    bundle = rejected;
                    std::thread::sleep(Duration::from_micros(50));
                }
            }
        }
    }

    fn try_recv_any(&self) -> Option<Bundle> {
        self.adaptor.try_recv()
    }

    fn wait_for<T>(&self, timeout: Duration, mut pick: impl FnMut(Bundle) -> Option<T>) -> Result<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(bundle) = self.try_recv_any() {
                if let Some(v) = pick(bundle) {
                    return Ok(v);
                }
            }
            if Instant::now() > deadline {
                return Err(Error::timeout("no reply before deadline"));
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }
}
