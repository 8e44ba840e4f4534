//! The graph store
//!
//! Maps `(vertex, predicate, direction)` to sorted adjacency lists and
//! typed attribute values, and maintains the local index entries:
//!
//! - `(0, p, OUT)` — local subjects with an outgoing `p` edge
//! - `(0, p, IN)` — local objects with an incoming `p` edge
//! - `(0, t, IN)` — local instances of type `t`
//! - `(0, TYPE_ID, IN)` — all local vertices (VERSATILE)
//! - `(0, TYPE_ID, OUT)` — all local types (VERSATILE)
//! - `(0, PREDICATE_ID, OUT)` — all local predicates (VERSATILE)
//! - `(v, PREDICATE_ID, d)` — predicates incident on `v` (VERSATILE)
//!
//! Type triples are kept out of the plain predicate index; the
//! `(0, TYPE_ID, *)` keys are repurposed for the VERSATILE summaries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tracing::{info, warn};

use shoal_core::{hash_mod, AttrTriple, AttrValue, ClusterConfig, Dir, Triple, Vid, PREDICATE_ID, TYPE_ID};

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::layout::{
    pack_value, unpack_value, EdgeKey, Geometry, ASSOCIATIVITY, BUCKET_WORDS, CHAIN_KEY, EMPTY_KEY,
    SLOT_WORDS,
};
use crate::remote::{RemoteMem, ThreadScratch};

/// An adjacency list, either borrowed from the local arena or landed in the
/// calling thread's scratch by a remote read
pub enum Edges<'a> {
    Local { arena: &'a Arena, base: u64, len: u64 },
    Remote(&'a [u64]),
    Empty,
}

impl<'a> Edges<'a> {
    pub fn len(&self) -> usize {
        match self {
            Edges::Local { len, .. } => *len as usize,
            Edges::Remote(words) => words.len(),
            Edges::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Vid {
        match self {
            Edges::Local { arena, base, .. } => arena.load(base + i as u64),
            Edges::Remote(words) => words[i],
            Edges::Empty => unreachable!("index into empty edge list"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Vid> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn contains(&self, v: Vid) -> bool {
        self.iter().any(|x| x == v)
    }

    pub fn to_vec(&self) -> Vec<Vid> {
        self.iter().collect()
    }
}

/// Index material accumulated during bulk insert, drained by `insert_index`
#[derive(Default)]
struct IndexAcc {
    pidx_out: HashMap<Vid, Vec<Vid>>,
    pidx_in: HashMap<Vid, Vec<Vid>>,
    tidx: HashMap<Vid, Vec<Vid>>,
    vset: HashSet<Vid>,
    tset: HashSet<Vid>,
    pset: HashSet<Vid>,
}

impl IndexAcc {
    fn merge(&mut self, other: IndexAcc) {
        for (p, mut vs) in other.pidx_out {
            self.pidx_out.entry(p).or_default().append(&mut vs);
        }
        for (p, mut vs) in other.pidx_in {
            self.pidx_in.entry(p).or_default().append(&mut vs);
        }
        for (t, mut vs) in other.tidx {
            self.tidx.entry(t).or_default().append(&mut vs);
        }
        self.vset.extend(other.vset);
        self.tset.extend(other.tset);
        self.pset.extend(other.pset);
    }
}

/// The per-server graph store
pub struct GStore {
    sid: usize,
    cfg: Arc<ClusterConfig>,
    geom: Geometry,
    arena: Arc<Arena>,
    /// Absolute bucket index of the next free overflow bucket
    next_indirect: AtomicU64,
    /// Next free payload word (relative to the payload zone)
    next_payload: AtomicU64,
    /// One lock per main bucket; chain operations hold the main bucket's lock
    bucket_locks: Vec<Mutex<()>>,
    remote: OnceLock<Arc<dyn RemoteMem>>,
    acc: Mutex<IndexAcc>,
}

impl GStore {
    pub fn new(sid: usize, cfg: Arc<ClusterConfig>) -> Self {
        let geom = Geometry::derive(cfg.kvstore_words);
        let arena = Arc::new(Arena::new(cfg.kvstore_words));
        let mut bucket_locks = Vec::with_capacity(geom.num_main_buckets as usize);
        bucket_locks.resize_with(geom.num_main_buckets as usize, || Mutex::new(()));
        Self {
            sid,
            cfg,
            geom,
            arena,
            next_indirect: AtomicU64::new(geom.num_main_buckets),
            next_payload: AtomicU64::new(0),
            bucket_locks,
            remote: OnceLock::new(),
            acc: Mutex::new(IndexAcc::default()),
        }
    }

    pub fn sid(&self) -> usize {
        self.sid
    }

    pub fn geometry(&self) -> Geometry {
        self.geom
    }

    /// The backing arena; the loader stages into it before `refresh`
    pub fn arena(&self) -> Arc<Arena> {
        Arc::clone(&self.arena)
    }

    /// Attach the one-sided fabric; must happen before any remote read
    pub fn set_remote(&self, remote: Arc<dyn RemoteMem>) {
        let _ = self.remote.set(remote);
    }

    /// Reinitialize the bucket zone and allocators
    ///
    /// Called once after the load's staging phase; the staged bytes in the
    /// arena are dead at that point and the zone is rewritten to empty
    /// buckets.
    pub fn refresh(&self) {
        for b in 0..self.geom.num_buckets() {
            let base = self.geom.bucket_word_off(b);
            for s in 0..ASSOCIATIVITY {
                self.arena.store(base + (s * SLOT_WORDS) as u64 + 1, 0);
                self.arena.store(base + (s * SLOT_WORDS) as u64, EMPTY_KEY);
            }
        }
        self.next_indirect.store(self.geom.num_main_buckets, Ordering::Release);
        self.next_payload.store(0, Ordering::Release);
        *self.acc.lock() = IndexAcc::default();
    }

    // ------------------------------------------------------------------
    // lookup
    // ------------------------------------------------------------------

    fn find_slot(&self, packed: u64) -> Option<u64> {
        let mut b = self.geom.main_bucket_of(packed);
        loop {
            let base = self.geom.bucket_word_off(b);
            for s in 0..ASSOCIATIVITY - 1 {
                let k = self.arena.load(base + (s * SLOT_WORDS) as u64);
                if k == EMPTY_KEY {
                    return None;
                }
                if k == packed {
                    return Some(self.arena.load(base + (s * SLOT_WORDS) as u64 + 1));
                }
            }
            let chain_off = base + ((ASSOCIATIVITY - 1) * SLOT_WORDS) as u64;
            if self.arena.load(chain_off) == CHAIN_KEY {
                b = self.arena.load(chain_off + 1);
            } else {
                return None;
            }
        }
    }

    /// Local adjacency lookup; `None` when the key is absent
    pub fn edges_local(&self, vid: Vid, pid: Vid, dir: Dir) -> Option<Edges<'_>> {
        let packed = EdgeKey::new(vid, pid, dir).pack().ok()?;
        let value = self.find_slot(packed)?;
        let (off, len, tag) = unpack_value(value);
        if tag != 0 {
            return None;
        }
        Some(Edges::Local {
            arena: &self.arena,
            base: self.geom.payload_word_off(off),
            len,
        })
    }

    /// Local index lookup: `(0, predicate_or_type, dir)`
    pub fn index_edges_local(&self, tpid: Vid, dir: Dir) -> Option<Edges<'_>> {
        self.edges_local(0, tpid, dir)
    }

    /// Local typed-attribute lookup
    pub fn attr_local(&self, vid: Vid, aid: Vid) -> Option<AttrValue> {
        let packed = EdgeKey::new(vid, aid, Dir::Out).pack().ok()?;
        let value = self.find_slot(packed)?;
        let (off, len, tag) = unpack_value(value);
        if tag == 0 || len != 1 {
            return None;
        }
        AttrValue::from_bits(tag, self.arena.load(self.geom.payload_word_off(off))).ok()
    }

    /// Adjacency lookup that follows the vertex to its owning shard
    ///
    /// Remote lists land in `scratch` and stay valid until this thread's
    /// next remote read. Without the one-sided fabric, remote vertices
    /// resolve to the empty list — the engine fork-joins rows to their
    /// owners in that mode, so non-local lookups only happen by design.
    pub fn edges_global<'a>(
        &'a self,
        scratch: &'a mut ThreadScratch,
        vid: Vid,
        pid: Vid,
        dir: Dir,
    ) -> Result<Edges<'a>> {
        let owner = hash_mod(vid, self.cfg.num_servers);
        if owner == self.sid {
            return Ok(self.edges_local(vid, pid, dir).unwrap_or(Edges::Empty));
        }
        if !self.cfg.use_rdma {
            return Ok(Edges::Empty);
        }
        let packed = EdgeKey::new(vid, pid, dir).pack()?;
        match self.remote_find_slot(scratch, owner, packed)? {
            Some((off, len, 0)) => {
                let remote = self.fabric()?;
                remote.read(
                    scratch.tid,
                    owner,
                    self.geom.payload_word_off(off),
                    len as usize,
                    &mut scratch.payload,
                )?;
                Ok(Edges::Remote(&scratch.payload))
            }
            _ => Ok(Edges::Empty),
        }
    }

    /// Attribute lookup that follows the vertex to its owning shard
    pub fn attr_global(
        &self,
        scratch: &mut ThreadScratch,
        vid: Vid,
        aid: Vid,
    ) -> Result<Option<AttrValue>> {
        let owner = hash_mod(vid, self.cfg.num_servers);
        if owner == self.sid {
            return Ok(self.attr_local(vid, aid));
        }
        if !self.cfg.use_rdma {
            return Ok(None);
        }
        let packed = EdgeKey::new(vid, aid, Dir::Out).pack()?;
        match self.remote_find_slot(scratch, owner, packed)? {
            Some((off, 1, tag)) if tag != 0 => {
                let remote = self.fabric()?;
                remote.read(
                    scratch.tid,
                    owner,
                    self.geom.payload_word_off(off),
                    1,
                    &mut scratch.payload,
                )?;
                Ok(AttrValue::from_bits(tag, scratch.payload[0]).ok())
            }
            _ => Ok(None),
        }
    }

    fn fabric(&self) -> Result<&Arc<dyn RemoteMem>> {
        self.remote
            .get()
            .ok_or_else(|| Error::remote("no one-sided fabric attached to this store"))
    }

    /// Walk a peer's buckets by address arithmetic; the geometry is shared,
    /// so no RPC is involved
    fn remote_find_slot(
        &self,
        scratch: &mut ThreadScratch,
        dst_sid: usize,
        packed: u64,
    ) -> Result<Option<(u64, u64, u8)>> {
        let remote = self.fabric()?;
        let mut b = self.geom.main_bucket_of(packed);
        loop {
            remote.read(
                scratch.tid,
                dst_sid,
                self.geom.bucket_word_off(b),
                BUCKET_WORDS,
                &mut scratch.bucket,
            )?;
            for s in 0..ASSOCIATIVITY - 1 {
                let k = scratch.bucket[s * SLOT_WORDS];
                if k == EMPTY_KEY {
                    return Ok(None);
                }
                if k == packed {
                    return Ok(Some(unpack_value(scratch.bucket[s * SLOT_WORDS + 1])));
                }
            }
            let chain_base = (ASSOCIATIVITY - 1) * SLOT_WORDS;
            if scratch.bucket[chain_base] == CHAIN_KEY {
                b = scratch.bucket[chain_base + 1];
                if b >= self.geom.num_buckets() {
                    return Err(Error::corrupt(format!(
                        "remote chain pointer {b} out of range on server {dst_sid}"
                    )));
                }
            } else {
                return Ok(None);
            }
        }
    }

    // ------------------------------------------------------------------
    // insert
    // ------------------------------------------------------------------

    fn alloc_payload(&self, n: u64) -> Result<u64> {
        let off = self.next_payload.fetch_add(n, Ordering::AcqRel);
        if off + n > self.geom.payload_words {
            return Err(Error::out_of_space(format!(
                "payload zone exhausted ({} of {} words)",
                off + n,
                self.geom.payload_words
            )));
        }
        Ok(off)
    }

    /// Find the slot holding `packed`, or the first free slot, extending the
    /// chain if every bucket on it is full. Caller holds the main bucket's
    /// lock.
    fn locate_slot_for_write(&self, packed: u64) -> Result<(u64, bool)> {
        let mut b = self.geom.main_bucket_of(packed);
        loop {
            let base = self.geom.bucket_word_off(b);
            for s in 0..ASSOCIATIVITY - 1 {
                let off = base + (s * SLOT_WORDS) as u64;
                let k = self.arena.load(off);
                if k == packed {
                    return Ok((off, true));
                }
                if k == EMPTY_KEY {
                    return Ok((off, false));
                }
            }
            let chain_off = base + ((ASSOCIATIVITY - 1) * SLOT_WORDS) as u64;
            if self.arena.load(chain_off) == CHAIN_KEY {
                b = self.arena.load(chain_off + 1);
            } else {
                let fresh = self.next_indirect.fetch_add(1, Ordering::AcqRel);
                if fresh >= self.geom.num_buckets() {
                    return Err(Error::out_of_space("overflow buckets exhausted"));
                }
                self.arena.store(chain_off + 1, fresh);
                self.arena.store(chain_off, CHAIN_KEY);
                b = fresh;
            }
        }
    }

    /// Insert or replace a whole list for `key`
    fn put_list(&self, key: EdgeKey, words: &[u64], tag: u8) -> Result<()> {
        let packed = key.pack()?;
        let payload_off = self.alloc_payload(words.len() as u64)?;
        self.arena
            .write_slice(self.geom.payload_word_off(payload_off), words)?;
        let value = pack_value(payload_off, words.len() as u64, tag)?;

        let lock_idx = self.geom.main_bucket_of(packed) as usize;
        let _guard = self.bucket_locks[lock_idx].lock();
        let (slot_off, _existing) = self.locate_slot_for_write(packed)?;
        // value word first, key word second: readers that see the key see
        // a coherent value
        self.arena.store(slot_off + 1, value);
        self.arena.store(slot_off, packed);
        Ok(())
    }

    /// Append one entry to `key`'s list, creating it if absent
    ///
    /// Returns `false` when `check_dup` finds the value already present.
    fn extend_list(&self, key: EdgeKey, val: u64, tag: u8, check_dup: bool) -> Result<bool> {
        let packed = key.pack()?;
        let lock_idx = self.geom.main_bucket_of(packed) as usize;
        let _guard = self.bucket_locks[lock_idx].lock();

        let (slot_off, existing) = self.locate_slot_for_write(packed)?;
        if !existing {
            let payload_off = self.alloc_payload(1)?;
            self.arena.store(self.geom.payload_word_off(payload_off), val);
            self.arena.store(slot_off + 1, pack_value(payload_off, 1, tag)?);
            self.arena.store(slot_off, packed);
            return Ok(true);
        }

        let (old_off, old_len, old_tag) = unpack_value(self.arena.load(slot_off + 1));
        if old_tag != tag {
            return Err(Error::corrupt(format!(
                "type tag mismatch extending {key:?}: {old_tag} vs {tag}"
            )));
        }
        let old_base = self.geom.payload_word_off(old_off);
        if check_dup {
            for i in 0..old_len {
                if self.arena.load(old_base + i) == val {
                    return Ok(false);
                }
            }
        }
        let payload_off = self.alloc_payload(old_len + 1)?;
        let new_base = self.geom.payload_word_off(payload_off);
        for i in 0..old_len {
            self.arena.store(new_base + i, self.arena.load(old_base + i));
        }
        self.arena.store(new_base + old_len, val);
        // single-word publish: readers see the old or the new (off, len)
        self.arena
            .store(slot_off + 1, pack_value(payload_off, old_len + 1, tag)?);
        Ok(true)
    }

    /// Bulk-insert one engine thread's share of the sorted, deduplicated
    /// triples (`out_triples` subject-grouped, `in_triples` object-grouped)
    pub fn insert_normal(&self, out_triples: &[Triple], in_triples: &[Triple]) -> Result<()> {
        let versatile = self.cfg.versatile;
        let mut acc = IndexAcc::default();

        let mut i = 0;
        while i < out_triples.len() {
            let s = out_triples[i].s;
            let mut preds: Vec<Vid> = Vec::new();
            while i < out_triples.len() && out_triples[i].s == s {
                let p = out_triples[i].p;
                let mut list: Vec<u64> = Vec::new();
                while i < out_triples.len() && out_triples[i].s == s && out_triples[i].p == p {
                    list.push(out_triples[i].o);
                    i += 1;
                }
                self.put_list(EdgeKey::new(s, p, Dir::Out), &list, 0)?;
                preds.push(p);
                if p == TYPE_ID {
                    for &t in &list {
                        acc.tidx.entry(t).or_default().push(s);
                        acc.tset.insert(t);
                    }
                } else {
                    acc.pidx_out.entry(p).or_default().push(s);
                }
                acc.pset.insert(p);
            }
            acc.vset.insert(s);
            if versatile {
                self.put_list(EdgeKey::new(s, PREDICATE_ID, Dir::Out), &preds, 0)?;
            }
        }

        let mut i = 0;
        while i < in_triples.len() {
            let o = in_triples[i].o;
            let mut preds: Vec<Vid> = Vec::new();
            while i < in_triples.len() && in_triples[i].o == o {
                let p = in_triples[i].p;
                let mut list: Vec<u64> = Vec::new();
                while i < in_triples.len() && in_triples[i].o == o && in_triples[i].p == p {
                    list.push(in_triples[i].s);
                    i += 1;
                }
                self.put_list(EdgeKey::new(o, p, Dir::In), &list, 0)?;
                preds.push(p);
                if p != TYPE_ID {
                    acc.pidx_in.entry(p).or_default().push(o);
                    acc.vset.insert(o);
                }
                acc.pset.insert(p);
            }
            if versatile {
                self.put_list(EdgeKey::new(o, PREDICATE_ID, Dir::In), &preds, 0)?;
            }
        }

        self.acc.lock().merge(acc);
        Ok(())
    }

    /// Bulk-insert one engine thread's attribute triples
    pub fn insert_attr(&self, attrs: &[AttrTriple]) -> Result<()> {
        for at in attrs {
            self.put_list(
                EdgeKey::new(at.s, at.a, Dir::Out),
                &[at.v.to_bits()],
                at.v.type_tag(),
            )?;
        }
        Ok(())
    }

    /// Build the local index entries from the material accumulated during
    /// `insert_normal`
    pub fn insert_index(&self) -> Result<()> {
        let acc = std::mem::take(&mut *self.acc.lock());

        for (p, mut subjects) in acc.pidx_out {
            subjects.sort_unstable();
            subjects.dedup();
            self.put_list(EdgeKey::new(0, p, Dir::Out), &subjects, 0)?;
        }

        // objects with incoming p, merged with instance lists keyed the
        // same way when an ID is both predicate and type
        let mut in_index: HashMap<Vid, Vec<Vid>> = acc.pidx_in;
        for (t, mut instances) in acc.tidx {
            in_index.entry(t).or_default().append(&mut instances);
        }
        for (x, mut members) in in_index {
            members.sort_unstable();
            members.dedup();
            self.put_list(EdgeKey::new(0, x, Dir::In), &members, 0)?;
        }

        if self.cfg.versatile {
            let mut vs: Vec<Vid> = acc.vset.into_iter().collect();
            vs.sort_unstable();
            self.put_list(EdgeKey::new(0, TYPE_ID, Dir::In), &vs, 0)?;

            let mut ts: Vec<Vid> = acc.tset.into_iter().collect();
            ts.sort_unstable();
            self.put_list(EdgeKey::new(0, TYPE_ID, Dir::Out), &ts, 0)?;

            let mut ps: Vec<Vid> = acc.pset.into_iter().collect();
            ps.sort_unstable();
            self.put_list(EdgeKey::new(0, PREDICATE_ID, Dir::Out), &ps, 0)?;
        }
        Ok(())
    }

    /// Incremental insert of the OUT side of a triple on `s`'s owner
    pub fn insert_triple_out(&self, t: Triple, check_dup: bool) -> Result<bool> {
        let inserted = self.extend_list(EdgeKey::new(t.s, t.p, Dir::Out), t.o, 0, check_dup)?;
        if !inserted {
            return Ok(false);
        }
        if t.p == TYPE_ID {
            self.extend_list(EdgeKey::new(0, t.o, Dir::In), t.s, 0, true)?;
            if self.cfg.versatile {
                self.extend_list(EdgeKey::new(0, TYPE_ID, Dir::Out), t.o, 0, true)?;
            }
        } else {
            self.extend_list(EdgeKey::new(0, t.p, Dir::Out), t.s, 0, true)?;
        }
        if self.cfg.versatile {
            self.extend_list(EdgeKey::new(t.s, PREDICATE_ID, Dir::Out), t.p, 0, true)?;
            self.extend_list(EdgeKey::new(0, TYPE_ID, Dir::In), t.s, 0, true)?;
            self.extend_list(EdgeKey::new(0, PREDICATE_ID, Dir::Out), t.p, 0, true)?;
        }
        Ok(true)
    }

    /// Incremental insert of the IN side of a triple on `o`'s owner
    pub fn insert_triple_in(&self, t: Triple, check_dup: bool) -> Result<bool> {
        let inserted = self.extend_list(EdgeKey::new(t.o, t.p, Dir::In), t.s, 0, check_dup)?;
        if !inserted {
            return Ok(false);
        }
        if t.p != TYPE_ID {
            self.extend_list(EdgeKey::new(0, t.p, Dir::In), t.o, 0, true)?;
            if self.cfg.versatile {
                self.extend_list(EdgeKey::new(0, TYPE_ID, Dir::In), t.o, 0, true)?;
            }
        }
        if self.cfg.versatile {
            self.extend_list(EdgeKey::new(t.o, PREDICATE_ID, Dir::In), t.p, 0, true)?;
            self.extend_list(EdgeKey::new(0, PREDICATE_ID, Dir::Out), t.p, 0, true)?;
        }
        Ok(true)
    }

    /// Incremental attribute insert (replaces any previous value)
    pub fn insert_attr_single(&self, at: AttrTriple) -> Result<()> {
        self.put_list(
            EdgeKey::new(at.s, at.a, Dir::Out),
            &[at.v.to_bits()],
            at.v.type_tag(),
        )
    }

    // ------------------------------------------------------------------
    // maintenance
    // ------------------------------------------------------------------

    fn for_each_entry(&self, mut f: impl FnMut(EdgeKey, u64, u64, u8)) {
        for b in 0..self.geom.num_buckets() {
            let base = self.geom.bucket_word_off(b);
            for s in 0..ASSOCIATIVITY - 1 {
                let k = self.arena.load(base + (s * SLOT_WORDS) as u64);
                if k == EMPTY_KEY || k == CHAIN_KEY {
                    continue;
                }
                let (off, len, tag) = unpack_value(self.arena.load(base + (s * SLOT_WORDS) as u64 + 1));
                f(EdgeKey::unpack(k), off, len, tag);
            }
        }
    }

    /// Consistency self-check; returns the number of violations found
    pub fn gstore_check(&self, index_check: bool, normal_check: bool) -> usize {
        let mut errors = 0usize;
        let mut entries: Vec<(EdgeKey, u64, u64, u8)> = Vec::new();
        self.for_each_entry(|k, off, len, tag| entries.push((k, off, len, tag)));

        let list_of = |off: u64, len: u64| -> Vec<Vid> {
            (0..len)
                .map(|i| self.arena.load(self.geom.payload_word_off(off) + i))
                .collect()
        };

        for &(key, off, len, tag) in &entries {
            if tag != 0 {
                continue; // attribute entries have no index counterpart
            }
            let members = list_of(off, len);

            if key.vid == 0 {
                // index entry
                if !index_check || key.pid == TYPE_ID || key.pid == PREDICATE_ID {
                    continue; // VERSATILE summaries are not checkable per-member
                }
                for &m in &members {
                    let ok = match key.dir {
                        Dir::Out => self
                            .edges_local(m, key.pid, Dir::Out)
                            .is_some_and(|e| !e.is_empty()),
                        Dir::In => {
                            self.edges_local(m, key.pid, Dir::In)
                                .is_some_and(|e| !e.is_empty())
                                || self
                                    .edges_local(m, TYPE_ID, Dir::Out)
                                    .is_some_and(|e| e.contains(key.pid))
                        }
                    };
                    if !ok {
                        warn!(
                            sid = self.sid,
                            vid = m,
                            pid = key.pid,
                            dir = ?key.dir,
                            "index entry with no matching edges"
                        );
                        errors += 1;
                    }
                }
            } else if normal_check && key.pid != PREDICATE_ID {
                if key.pid == TYPE_ID {
                    if key.dir == Dir::Out {
                        for &t in &members {
                            let ok = self
                                .index_edges_local(t, Dir::In)
                                .is_some_and(|e| e.contains(key.vid));
                            if !ok {
                                warn!(sid = self.sid, vid = key.vid, t, "vertex missing from type index");
                                errors += 1;
                            }
                        }
                    }
                    // IN type lists reference subjects that may live on
                    // other shards; not locally checkable
                } else {
                    let ok = self
                        .index_edges_local(key.pid, key.dir)
                        .is_some_and(|e| e.contains(key.vid));
                    if !ok {
                        warn!(
                            sid = self.sid,
                            vid = key.vid,
                            pid = key.pid,
                            dir = ?key.dir,
                            "vertex missing from predicate index"
                        );
                        errors += 1;
                    }
                }
            }
        }
        errors
    }

    /// Log arena utilization
    pub fn print_mem_usage(&self) {
        let indirect_used =
            self.next_indirect.load(Ordering::Acquire) - self.geom.num_main_buckets;
        let payload_used = self.next_payload.load(Ordering::Acquire);
        info!(
            sid = self.sid,
            main_buckets = self.geom.num_main_buckets,
            indirect_used,
            indirect_total = self.geom.num_indirect_buckets,
            payload_used,
            payload_total = self.geom.payload_words,
            "gstore memory usage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> Arc<ClusterConfig> {
        Arc::new(ClusterConfig {
            num_servers: 1,
            kvstore_words: 1 << 14,
            ..Default::default()
        })
    }

    fn fresh_store() -> GStore {
        let st = GStore::new(0, test_cfg());
        st.refresh();
        st
    }

    #[test]
    fn test_put_and_lookup() {
        let st = fresh_store();
        st.put_list(EdgeKey::new(10, 100, Dir::Out), &[11, 12], 0).unwrap();
        let edges = st.edges_local(10, 100, Dir::Out).unwrap();
        assert_eq!(edges.to_vec(), vec![11, 12]);
        assert!(st.edges_local(10, 100, Dir::In).is_none());
        assert!(st.edges_local(11, 100, Dir::Out).is_none());
    }

    #[test]
    fn test_attr_roundtrip() {
        let st = fresh_store();
        st.insert_attr(&[AttrTriple::new(11, 200, AttrValue::Int(25))]).unwrap();
        assert_eq!(st.attr_local(11, 200), Some(AttrValue::Int(25)));
        assert_eq!(st.attr_local(12, 200), None);
        // attribute entries are invisible to edge lookups
        assert!(st.edges_local(11, 200, Dir::Out).is_none());
    }

    #[test]
    fn test_overflow_chains() {
        let st = fresh_store();
        let geom = st.geometry();
        // pick distinct keys that all land in one main bucket, enough to
        // overflow it twice
        let target = geom.main_bucket_of(EdgeKey::new(1, 7, Dir::Out).pack().unwrap());
        let colliders: Vec<Vid> = (1..100_000u64)
            .filter(|&v| {
                let k = EdgeKey::new(v, 7, Dir::Out).pack().unwrap();
                geom.main_bucket_of(k) == target
            })
            .take(20)
            .collect();
        assert_eq!(colliders.len(), 20);

        for &v in &colliders {
            st.put_list(EdgeKey::new(v, 7, Dir::Out), &[v + 1], 0).unwrap();
        }
        for &v in &colliders {
            let e = st.edges_local(v, 7, Dir::Out).unwrap();
            assert_eq!(e.to_vec(), vec![v + 1]);
        }
    }

    #[test]
    fn test_extend_with_dup_check() {
        let st = fresh_store();
        assert!(st.insert_triple_out(Triple::new(10, 100, 11), true).unwrap());
        assert!(st.insert_triple_out(Triple::new(10, 100, 12), true).unwrap());
        assert!(!st.insert_triple_out(Triple::new(10, 100, 11), true).unwrap());
        let e = st.edges_local(10, 100, Dir::Out).unwrap();
        assert_eq!(e.to_vec(), vec![11, 12]);
        // index maintained incrementally
        let idx = st.index_edges_local(100, Dir::Out).unwrap();
        assert_eq!(idx.to_vec(), vec![10]);
    }

    #[test]
    fn test_bulk_insert_builds_index() {
        let st = fresh_store();
        let mut out = vec![
            Triple::new(10, 100, 11),
            Triple::new(10, 100, 12),
            Triple::new(10, 1, 300), // rdf:type
        ];
        out.sort_by(Triple::cmp_spo);
        let mut inn = vec![Triple::new(10, 100, 11), Triple::new(10, 100, 12)];
        inn.sort_by(Triple::cmp_ops);
        st.insert_normal(&out, &inn).unwrap();
        st.insert_index().unwrap();

        assert_eq!(st.index_edges_local(100, Dir::Out).unwrap().to_vec(), vec![10]);
        let mut objs = st.index_edges_local(100, Dir::In).unwrap().to_vec();
        objs.sort_unstable();
        assert_eq!(objs, vec![11, 12]);
        // type index: instances of 300
        assert_eq!(st.index_edges_local(300, Dir::In).unwrap().to_vec(), vec![10]);
        // versatile: per-vertex predicate list
        let preds = st.edges_local(10, PREDICATE_ID, Dir::Out).unwrap().to_vec();
        assert!(preds.contains(&100) && preds.contains(&TYPE_ID));
    }

    #[test]
    fn test_gstore_check_clean() {
        let st = fresh_store();
        let out = vec![Triple::new(10, 100, 11)];
        let inn = vec![Triple::new(10, 100, 11)];
        st.insert_normal(&out, &inn).unwrap();
        st.insert_index().unwrap();
        assert_eq!(st.gstore_check(true, true), 0);
    }

    #[test]
    fn test_remote_protocol_in_process() {
        // a trivial in-process fabric over the peer's own arena
        struct LoopMem(Arc<Arena>);
        impl RemoteMem for LoopMem {
            fn read(&self, _tid: usize, _dst: usize, off: u64, n: usize, out: &mut Vec<u64>) -> Result<()> {
                self.0.read_into(off, n, out)
            }
            fn write(&self, _tid: usize, _dst: usize, off: u64, data: &[u64]) -> Result<()> {
                self.0.write_slice(off, data)
            }
        }

        // two "servers" sharing a config; data lives on whichever shard
        // owns vid per hash_mod
        let cfg = Arc::new(ClusterConfig {
            num_servers: 2,
            kvstore_words: 1 << 14,
            ..Default::default()
        });
        let owner_of = |v: Vid| hash_mod(v, 2);

        // find a vid owned by server 1
        let vid = (1..100).find(|&v| owner_of(v) == 1).unwrap();

        let st0 = GStore::new(0, Arc::clone(&cfg));
        let st1 = GStore::new(1, Arc::clone(&cfg));
        st0.refresh();
        st1.refresh();
        st1.put_list(EdgeKey::new(vid, 100, Dir::Out), &[5, 6, 7], 0).unwrap();

        st0.set_remote(Arc::new(LoopMem(st1.arena())));
        let mut scratch = ThreadScratch::new(0);
        let edges = st0.edges_global(&mut scratch, vid, 100, Dir::Out).unwrap();
        assert_eq!(edges.to_vec(), vec![5, 6, 7]);

        let miss = st0.edges_global(&mut scratch, vid, 99, Dir::Out).unwrap();
        assert!(miss.is_empty());
    }
}
