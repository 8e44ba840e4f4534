//! The query driver
//!
//! Wraps one engine thread's execution context and advances queries:
//! force-dispatch fan-out for index starts, the step loop with the co-run
//! semi-join, UNION/OPTIONAL dispatch on completion, fork/join when the
//! next anchor leaves this shard, and reply merging through the owner's
//! reply map.
//!
//! Engines are shared between threads: the owner thread runs the worker
//! loop, a work-stealing neighbor may execute on this engine's behalf.
//! Everything mutable sits behind its own lock or atomic; the per-thread
//! read scratch is owned by the calling thread and passed down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use shoal_core::{hash_mod, ClusterConfig, Term, Vid};
use shoal_graph::Graph;
use shoal_net::Adaptor;
use shoal_query::{Bundle, Coder, PatternGroup, SparqlQuery, VarType};
use shoal_query::QueryKind;
use shoal_store::ThreadScratch;

use crate::error::{Error, Result};
use crate::filter::apply_filters;
use crate::finalize::final_process;
use crate::kernels::execute_one_step;
use crate::rmap::ReplyMap;

struct PendingMsg {
    dst_sid: usize,
    dst_tid: usize,
    bundle: Bundle,
}

/// One engine thread's execution context
pub struct Engine {
    sid: usize,
    /// Thread ID on this server (engines start at `cfg.engine_tid_base()`)
    tid: usize,
    cfg: Arc<ClusterConfig>,
    graph: Arc<Graph>,
    adaptor: Adaptor,
    coder: Mutex<Coder>,
    rmap: Mutex<ReplyMap>,
    fast_path: Mutex<VecDeque<SparqlQuery>>,
    new_queue: Mutex<VecDeque<SparqlQuery>>,
    pending: Mutex<Vec<PendingMsg>>,
    /// Last time this engine was seen working, µs since the cluster epoch;
    /// the work-stealing neighbor reads it
    last_time: AtomicU64,
    epoch: Instant,
}

impl Engine {
    pub fn new(
        sid: usize,
        tid: usize,
        cfg: Arc<ClusterConfig>,
        graph: Arc<Graph>,
        adaptor: Adaptor,
        epoch: Instant,
    ) -> Self {
        Self {
            sid,
            tid,
            cfg,
            graph,
            adaptor,
            coder: Mutex::new(Coder::new(sid, tid)),
            rmap: Mutex::new(ReplyMap::new()),
            fast_path: Mutex::new(VecDeque::new()),
            new_queue: Mutex::new(VecDeque::new()),
            pending: Mutex::new(Vec::new()),
            last_time: AtomicU64::new(0),
            epoch,
        }
    }

    pub fn sid(&self) -> usize {
        self.sid
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    pub fn config(&self) -> &Arc<ClusterConfig> {
        &self.cfg
    }

    pub fn adaptor(&self) -> &Adaptor {
        &self.adaptor
    }

    /// Globally-unique thread index, used for remote-read scratch affinity
    pub fn global_thread_index(&self) -> usize {
        self.sid * self.cfg.num_threads() + self.tid
    }

    pub fn now_usec(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Record that this engine is live (read by the stealing neighbor)
    pub fn touch(&self) {
        self.last_time.store(self.now_usec(), Ordering::Release);
    }

    pub fn last_time_usec(&self) -> u64 {
        self.last_time.load(Ordering::Acquire)
    }

    pub fn push_fast_path(&self, q: SparqlQuery) {
        self.fast_path.lock().push_back(q);
    }

    pub fn pop_fast_path(&self) -> Option<SparqlQuery> {
        self.fast_path.lock().pop_front()
    }

    pub fn push_new_queue(&self, q: SparqlQuery) {
        self.new_queue.lock().push_back(q);
    }

    pub fn pop_new_queue(&self) -> Option<SparqlQuery> {
        self.new_queue.lock().pop_front()
    }

    /// Retry previously-backpressured sends
    pub fn sweep_pending(&self) {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return;
        }
        debug!(sid = self.sid, tid = self.tid, count = pending.len(), "retrying pending messages");
        let stashed: Vec<PendingMsg> = std::mem::take(&mut *pending);
        for msg in stashed {
            if let Err(bundle) = self.adaptor.send(msg.dst_sid, msg.dst_tid, msg.bundle) {
                pending.push(PendingMsg {
                    dst_sid: msg.dst_sid,
                    dst_tid: msg.dst_tid,
                    bundle,
                });
            }
        }
    }

    /// Send, stashing on backpressure for a later sweep
    pub fn send_request(&self, bundle: Bundle, dst_sid: usize, dst_tid: usize) -> bool {
        match self.adaptor.send(dst_sid, dst_tid, bundle) {
            Ok(()) => true,
            Err(bundle) => {
                self.pending.lock().push(PendingMsg { dst_sid, dst_tid, bundle });
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // bundle dispatch
    // ------------------------------------------------------------------

    /// Execute one bundle. `owner` is the engine whose queue the bundle
    /// arrived on — replies merge into the owner's reply map even when a
    /// neighbor stole the execution.
    pub fn execute_bundle(&self, bundle: Bundle, owner: &Engine, scratch: &mut ThreadScratch) {
        match bundle {
            Bundle::Sparql(q) => self.execute_sparql_query(q, owner, scratch),
            Bundle::DynamicLoad(mut r) => {
                r.load_ret = match self.graph.dynamic_load(&r.dname, r.check_dup) {
                    Ok(n) => n as i64,
                    Err(e) => {
                        error!(sid = self.sid, %e, "dynamic load failed");
                        -1
                    }
                };
                self.send_request(
                    Bundle::DynamicLoad(r.clone()),
                    Coder::sid_of(r.pid),
                    Coder::tid_of(r.pid),
                );
            }
            Bundle::GStoreCheck(mut r) => {
                r.check_ret = self.graph.gstore_check(r.index_check, r.normal_check) as i64;
                self.send_request(
                    Bundle::GStoreCheck(r.clone()),
                    Coder::sid_of(r.pid),
                    Coder::tid_of(r.pid),
                );
            }
        }
    }

    /// Execute one query; protocol errors terminate it with an empty reply
    /// so the parent never hangs
    pub fn execute_sparql_query(&self, q: SparqlQuery, owner: &Engine, scratch: &mut ThreadScratch) {
        if q.is_request() {
            let pid = q.pid;
            if let Err(e) = self.execute_sparql_request(q, scratch) {
                error!(sid = self.sid, tid = self.tid, pid, %e, "query terminated");
                if pid >= 0 {
                    let mut reply = SparqlQuery::new(PatternGroup::default());
                    reply.pid = pid;
                    reply.kind = QueryKind::Reply;
                    self.send_request(
                        Bundle::Sparql(reply),
                        Coder::sid_of(pid),
                        Coder::tid_of(pid),
                    );
                }
            }
        } else if let Err(e) = self.execute_sparql_reply(q, owner) {
            error!(sid = self.sid, tid = self.tid, %e, "reply handling failed");
        }
    }

    // ------------------------------------------------------------------
    // request path
    // ------------------------------------------------------------------

    fn execute_sparql_request(&self, mut r: SparqlQuery, scratch: &mut ThreadScratch) -> Result<()> {
        r.id = self.coder.lock().next_qid();

        // index starts coming from a proxy fan out across every engine
        if r.force_dispatch
            || (r.step == 0
                && self.cfg.is_proxy_tid(Coder::tid_of(r.pid))
                && r.start_from_index()
                && self.cfg.mt_threshold * self.cfg.num_servers > 1)
        {
            return self.force_dispatch_index(r);
        }

        loop {
            execute_one_step(self.graph.as_ref(), scratch, &self.cfg, &mut r)?;

            if !r.is_finished() && Some(r.step) == r.corun_step {
                self.do_corun(&mut r, scratch)?;
            }

            if r.is_finished() {
                if r.is_union() {
                    return self.dispatch_unions(r);
                }
                // FILTER runs at the end of every distributed leg; OPTIONAL
                // parents delay it until their merge
                if !r.is_optional() {
                    apply_filters(&mut r, self.graph.dict())?;
                }
                if self.cfg.is_proxy_tid(Coder::tid_of(r.pid)) {
                    if r.is_optional() && !r.optional_dispatched {
                        return self.execute_optional(r);
                    }
                    final_process(&mut r, self.graph.dict())?;
                }
                self.send_reply(r);
                return Ok(());
            }

            if self.need_fork_join(&r) {
                let subs = self.generate_sub_query(&r)?;
                self.rmap.lock().put_parent_request(r, subs.len());
                for (i, sub) in subs.into_iter().enumerate() {
                    if i != self.sid {
                        self.send_request(Bundle::Sparql(sub), i, self.tid);
                    } else {
                        self.push_fast_path(sub);
                    }
                }
                return Ok(());
            }
        }
    }

    /// Fan an index start out across every participating engine with
    /// disjoint stride slices; the dispatcher takes no slice of its own
    ///
    /// When the dispatcher is itself one of the `mt_threshold` slice
    /// holders, its own server's slices renumber around the hole it leaves
    /// and decode to the shorter stride (the negative `tid` encoding).
    fn force_dispatch_index(&self, r: SparqlQuery) -> Result<()> {
        let m = self.cfg.mt_threshold;
        let servers = self.cfg.num_servers;
        let own_engine = self.tid - self.cfg.engine_tid_base();
        let hole = own_engine < m;
        let parent_id = r.id;

        let sub_count = servers * m - usize::from(hole);
        self.rmap.lock().put_parent_request(r.clone(), sub_count);

        let mut template = r;
        template.force_dispatch = false;
        template.pid = parent_id;
        for i in 0..servers {
            for j in 0..m {
                if hole && i == self.sid && j == own_engine {
                    continue;
                }
                let mut sub = template.clone();
                sub.id = -1;
                if hole && i == self.sid {
                    let off = (if j > own_engine { j - 1 } else { j }) as i64;
                    sub.tid = -off - 1;
                } else {
                    sub.tid = j as i64;
                }
                self.send_request(Bundle::Sparql(sub), i, self.cfg.engine_tid_base() + j);
            }
        }
        Ok(())
    }

    /// Fork/join when the next step's anchor leaves this shard
    fn need_fork_join(&self, r: &SparqlQuery) -> bool {
        if r.is_finished() {
            return false;
        }
        let start = r.current_pattern().subject;
        if r.result.variable_type(start) != VarType::Known {
            return false;
        }
        // without one-sided reads every hop must run on the data's shard
        if !self.cfg.use_rdma {
            return true;
        }
        r.local_var != start && r.result.get_row_num() >= self.cfg.rdma_threshold
    }

    /// Partition the rows by the owner of the next anchor's binding
    fn generate_sub_query(&self, r: &SparqlQuery) -> Result<Vec<SparqlQuery>> {
        let start = r.current_pattern().subject;
        let col = r
            .result
            .var2col(start)
            .ok_or_else(|| Error::protocol("fork-join anchor has no column"))?;
        let servers = self.cfg.num_servers;

        let mut subs: Vec<SparqlQuery> = (0..servers)
            .map(|_| {
                let mut sub = SparqlQuery::new(r.pattern_group.clone());
                sub.pid = r.id;
                sub.step = r.step;
                sub.corun_step = r.corun_step;
                sub.fetch_step = r.fetch_step;
                sub.local_var = start;
                sub.priority = r.priority + 1;
                sub.result.col_num = r.result.col_num;
                sub.result.attr_col_num = r.result.attr_col_num;
                sub.result.blind = r.result.blind;
                sub.result.v2c = r.result.v2c.clone();
                sub.result.nvars = r.result.nvars;
                sub
            })
            .collect();

        for i in 0..r.result.get_row_num() {
            let dst = hash_mod(r.result.get_row_col(i, col), servers);
            r.result.append_row_to(i, &mut subs[dst].result.table);
            if r.result.attr_col_num > 0 {
                r.result.append_attr_row_to(i, &mut subs[dst].result.attr_table);
            }
        }
        Ok(subs)
    }

    /// Spawn one sub-query per UNION alternative, seeded with the current
    /// rows, and wait for their replies
    fn dispatch_unions(&self, r: SparqlQuery) -> Result<()> {
        let groups = r.pattern_group.unions.clone();
        self.rmap.lock().put_parent_request(r.clone(), groups.len());

        for group in groups {
            let mut branch = SparqlQuery::new(group);
            branch.pid = r.id;
            branch.priority = r.priority + 1;
            branch.result = r.result.clone();
            branch.result.blind = false;
            if branch.start_from_index() && self.cfg.mt_threshold * self.cfg.num_servers > 1 {
                branch.force_dispatch = true;
            }
            let dst = branch
                .pattern_group
                .patterns
                .first()
                .filter(|p| p.subject > 0)
                .map(|p| hash_mod(p.subject as Vid, self.cfg.num_servers))
                .unwrap_or(self.sid);
            if dst != self.sid {
                self.send_request(Bundle::Sparql(branch), dst, self.tid);
            } else {
                self.push_fast_path(branch);
            }
        }
        Ok(())
    }

    /// Spawn one sub-query per OPTIONAL group, seeded with the parent's
    /// rows; called only on the proxy-facing leg
    fn execute_optional(&self, mut r: SparqlQuery) -> Result<()> {
        r.optional_dispatched = true;
        // re-key the parent under this engine's coder: when a stolen merge
        // continues here, child replies must route to this engine's map
        r.id = self.coder.lock().next_qid();
        let groups = r.pattern_group.optional.clone();
        self.rmap.lock().put_parent_request(r.clone(), groups.len());

        for group in groups {
            let mut opt = SparqlQuery::new(group);
            opt.pid = r.id;
            opt.priority = r.priority + 1;
            opt.result = r.result.clone();
            opt.result.blind = false;

            if self.need_fork_join(&opt) {
                opt.id = self.coder.lock().next_qid();
                let subs = self.generate_sub_query(&opt)?;
                self.rmap.lock().put_parent_request(opt, subs.len());
                for (i, sub) in subs.into_iter().enumerate() {
                    if i != self.sid {
                        self.send_request(Bundle::Sparql(sub), i, self.tid);
                    } else {
                        self.push_fast_path(sub);
                    }
                }
            } else {
                let dst = opt
                    .pattern_group
                    .patterns
                    .first()
                    .filter(|p| p.subject > 0)
                    .map(|p| hash_mod(p.subject as Vid, self.cfg.num_servers))
                    .unwrap_or(self.sid);
                if dst != self.sid {
                    self.send_request(Bundle::Sparql(opt), dst, self.tid);
                } else {
                    self.push_fast_path(opt);
                }
            }
        }
        Ok(())
    }

    /// Stamp a finished query as a reply and route it to its parent
    fn send_reply(&self, mut r: SparqlQuery) {
        r.result.row_num = r.result.get_row_num();
        if r.result.blind {
            r.result.clear_data();
        }
        r.kind = QueryKind::Reply;
        let dst_sid = Coder::sid_of(r.pid);
        let dst_tid = Coder::tid_of(r.pid);
        self.send_request(Bundle::Sparql(r), dst_sid, dst_tid);
    }

    // ------------------------------------------------------------------
    // reply path
    // ------------------------------------------------------------------

    fn execute_sparql_reply(&self, r: SparqlQuery, owner: &Engine) -> Result<()> {
        let pid = r.pid;
        let merged = {
            let mut rmap = owner.rmap.lock();
            rmap.put_reply(r);
            if rmap.is_ready(pid) {
                rmap.get_merged_reply(pid)
            } else {
                None
            }
        };

        let Some(mut reply) = merged else {
            return Ok(());
        };

        // OPTIONAL is processed after UNION, and FILTER follows the merge
        if reply.is_optional() || reply.is_union() {
            apply_filters(&mut reply, self.graph.dict())?;
        }
        if self.cfg.is_proxy_tid(Coder::tid_of(reply.pid)) {
            if reply.is_optional() && !reply.optional_dispatched {
                return self.execute_optional(reply);
            }
            final_process(&mut reply, self.graph.dict())?;
        }
        self.send_reply(reply);
        Ok(())
    }

    // ------------------------------------------------------------------
    // co-run
    // ------------------------------------------------------------------

    /// Speculatively run the next window of patterns over the distinct
    /// anchor values and semi-join-prune the working set, then skip the
    /// window
    fn do_corun(&self, req: &mut SparqlQuery, scratch: &mut ThreadScratch) -> Result<()> {
        let corun = req
            .corun_step
            .ok_or_else(|| Error::protocol("do_corun without corun_step"))?;
        let fetch = req
            .fetch_step
            .ok_or_else(|| Error::protocol("corun_step without fetch_step"))?;
        if corun >= fetch || fetch > req.pattern_group.patterns.len() {
            return Err(Error::protocol(format!(
                "bad corun window [{corun}, {fetch})"
            )));
        }

        let anchor = req.get_pattern(corun).subject;
        if anchor >= 0 {
            return Err(Error::protocol("corun anchor must be a variable"));
        }
        let anchor_col = req
            .result
            .var2col(anchor)
            .ok_or_else(|| Error::protocol("corun anchor has no column"))?;

        let t0 = Instant::now();

        // distinct anchor values seed the sub-query
        let mut uniq: HashSet<Vid> = HashSet::new();
        for i in 0..req.result.get_row_num() {
            uniq.insert(req.result.get_row_col(i, anchor_col));
        }

        // remap the window's variables to a fresh dense space
        let mut sub_pvars: HashMap<Term, Term> = HashMap::new();
        let mut group = PatternGroup::default();
        {
            let mut remap = |id: Term| -> Term {
                if id >= 0 {
                    return id;
                }
                let next = -(sub_pvars.len() as Term + 1);
                *sub_pvars.entry(id).or_insert(next)
            };
            for i in corun..fetch {
                let p = *req.get_pattern(i);
                let mut fresh = shoal_query::Pattern::new(
                    remap(p.subject),
                    remap(p.predicate),
                    p.direction,
                    remap(p.object),
                );
                fresh.pred_type = 0;
                group.patterns.push(fresh);
            }
        }

        let mut sub = SparqlQuery::new(group);
        sub.result.table = uniq.iter().copied().collect();
        sub.result.col_num = 1;
        sub.result.add_var2col(sub_pvars[&anchor], 0);
        sub.result.nvars = sub_pvars.len();
        let t1 = Instant::now();

        while !sub.is_finished() {
            execute_one_step(self.graph.as_ref(), scratch, &self.cfg, &mut sub)?;
        }
        let t2 = Instant::now();

        // semi-join on the window variables the main result already binds
        let mut keys: Vec<(usize, usize)> = sub_pvars
            .iter()
            .filter_map(|(&orig, &fresh)| {
                let main_col = req.result.var2col(orig)?;
                let sub_col = sub.result.var2col(fresh)?;
                Some((main_col, sub_col))
            })
            .collect();
        keys.sort_unstable_by_key(|&(_, sc)| sc);

        let mut updated = Vec::new();
        let mut updated_attr = Vec::new();
        let mut keep_row = |result: &shoal_query::ResultTable, i: usize, keep: bool| {
            if keep {
                result.append_row_to(i, &mut updated);
                if result.attr_col_num > 0 {
                    result.append_attr_row_to(i, &mut updated_attr);
                }
            }
        };

        match keys.len() {
            1 => {
                let (mc, sc) = keys[0];
                let set: HashSet<Vid> = (0..sub.result.get_row_num())
                    .map(|i| sub.result.get_row_col(i, sc))
                    .collect();
                for i in 0..req.result.get_row_num() {
                    keep_row(&req.result, i, set.contains(&req.result.get_row_col(i, mc)));
                }
            }
            2 => {
                let set: HashSet<(Vid, Vid)> = (0..sub.result.get_row_num())
                    .map(|i| {
                        (
                            sub.result.get_row_col(i, keys[0].1),
                            sub.result.get_row_col(i, keys[1].1),
                        )
                    })
                    .collect();
                for i in 0..req.result.get_row_num() {
                    let probe = (
                        req.result.get_row_col(i, keys[0].0),
                        req.result.get_row_col(i, keys[1].0),
                    );
                    keep_row(&req.result, i, set.contains(&probe));
                }
            }
            _ => {
                let mut tuples: Vec<Vec<Vid>> = (0..sub.result.get_row_num())
                    .map(|i| keys.iter().map(|&(_, sc)| sub.result.get_row_col(i, sc)).collect())
                    .collect();
                tuples.sort_unstable();
                for i in 0..req.result.get_row_num() {
                    let probe: Vec<Vid> =
                        keys.iter().map(|&(mc, _)| req.result.get_row_col(i, mc)).collect();
                    keep_row(&req.result, i, tuples.binary_search(&probe).is_ok());
                }
            }
        }
        let t3 = Instant::now();

        if self.sid == 0 && self.tid == self.cfg.engine_tid_base() {
            info!(
                prepare_us = (t1 - t0).as_micros() as u64,
                execute_us = (t2 - t1).as_micros() as u64,
                lookup_us = (t3 - t2).as_micros() as u64,
                "co-run timings"
            );
        }

        req.result.table = updated;
        req.result.attr_table = updated_attr;
        req.step = fetch;
        Ok(())
    }
}
