//! Bulk load: staging, aggregation, store build
//!
//! Loading runs in two phases with a cluster-wide barrier between them:
//!
//! 1. **Stage** — triples are parsed and scattered into per-source slots of
//!    each owning server's arena. With the one-sided fabric each server
//!    reads only its share of the files (`i mod S == sid`) and remote-writes
//!    each triple to its shard(s); without it, every server reads every file
//!    and keeps what it owns, staging locally per engine thread.
//! 2. **Build** — each server scans all staged partitions, deals triples to
//!    engine threads (`s mod M` for OUT, `o mod M` for IN), sorts and
//!    deduplicates per the store ordering, reinitializes the store, and
//!    inserts lists, attributes and indices.
//!
//! A staging slot is `[count, s, p, o, s, p, o, ...]`; the leading count is
//! written when the source finishes. Budget overflow during staging is
//! fatal.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use shoal_core::{hash_mod, AttrTriple, AttrValue, ClusterConfig, Triple, Vid};
use shoal_store::{Arena, GStore, RemoteMem};

use crate::error::{Error, Result};
use crate::files::{list_files, TokenReader};

/// Words per staging slot when the arena is split into `parts` slots
fn slot_words(total_words: usize, parts: usize) -> u64 {
    (total_words / parts) as u64
}

fn slot_base(slot_w: u64, idx: usize) -> u64 {
    slot_w * idx as u64
}

/// Triples a slot can hold after its count word
fn slot_capacity(slot_w: u64) -> u64 {
    (slot_w - 1) / 3
}

/// Staging outcome handed to `build` after the cluster barrier
pub struct LoadPhase {
    pub num_partitions: usize,
    pub attr_files: Vec<PathBuf>,
}

/// Per-server bulk loader
pub struct Loader {
    sid: usize,
    cfg: Arc<ClusterConfig>,
    store: Arc<GStore>,
    remote: Arc<dyn RemoteMem>,
}

impl Loader {
    pub fn new(sid: usize, cfg: Arc<ClusterConfig>, store: Arc<GStore>, remote: Arc<dyn RemoteMem>) -> Self {
        Self { sid, cfg, store, remote }
    }

    /// Phase 1: parse input files and stage triples on their owning shards
    ///
    /// All servers must finish staging before any calls `build`.
    pub fn stage(&self) -> Result<LoadPhase> {
        let dfiles = list_files(&self.cfg.input_folder, "id_")?;
        let attr_files = list_files(&self.cfg.input_folder, "attr_")?;

        if dfiles.is_empty() {
            warn!(sid = self.sid, folder = %self.cfg.input_folder, "no data files found");
        } else {
            info!(
                sid = self.sid,
                data_files = dfiles.len(),
                attr_files = attr_files.len(),
                folder = %self.cfg.input_folder,
                "input files found"
            );
        }

        let start = Instant::now();
        let num_partitions = if self.cfg.use_rdma {
            self.stage_exchange(&dfiles)?;
            self.cfg.num_servers
        } else {
            self.stage_allfiles(&dfiles)?;
            self.cfg.num_engines
        };
        info!(
            sid = self.sid,
            ms = start.elapsed().as_millis() as u64,
            "staged data files"
        );

        Ok(LoadPhase { num_partitions, attr_files })
    }

    /// Exchange-load: read own share of files, scatter by one-sided writes
    fn stage_exchange(&self, dfiles: &[PathBuf]) -> Result<()> {
        let servers = self.cfg.num_servers;
        let engines = self.cfg.num_engines;
        let slot_w = slot_words(self.cfg.kvstore_words, servers);
        let capacity = slot_capacity(slot_w);
        let sent: Vec<AtomicU64> = (0..servers).map(|_| AtomicU64::new(0)).collect();

        // files this server owns, dealt round-robin to engine threads
        let own_files: Vec<PathBuf> = dfiles
            .iter()
            .enumerate()
            .filter(|(i, _)| i % servers == self.sid)
            .map(|(_, p)| p.clone())
            .collect();

        std::thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = (0..engines)
                .map(|t| {
                    let files: Vec<PathBuf> = own_files
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| i % engines == t)
                        .map(|(_, p)| p.clone())
                        .collect();
                    let sent = &sent;
                    scope.spawn(move || self.stage_exchange_thread(t, files, sent, slot_w, capacity))
                })
                .collect();
            for h in handles {
                h.join().expect("stage thread panicked")?;
            }
            Ok(())
        })?;

        // publish the final per-destination counts into the slot prefixes
        for dst in 0..servers {
            let n = sent[dst].load(Ordering::Acquire);
            self.remote
                .write(0, dst, slot_base(slot_w, self.sid), &[n])?;
            debug!(sid = self.sid, dst, triples = n, "staged triples for shard");
        }
        Ok(())
    }

    fn stage_exchange_thread(
        &self,
        tid: usize,
        files: Vec<PathBuf>,
        sent: &[AtomicU64],
        slot_w: u64,
        capacity: u64,
    ) -> Result<()> {
        let servers = self.cfg.num_servers;
        let buf_words = self.cfg.buffer_triples * 3;
        let mut bufs: Vec<Vec<u64>> = (0..servers).map(|_| Vec::with_capacity(buf_words)).collect();

        for path in &files {
            let mut reader = TokenReader::open(path)?;
            while let Some(s) = reader.next_u64()? {
                let p = reader
                    .next_u64()?
                    .ok_or_else(|| Error::load(format!("truncated triple in {}", reader.path())))?;
                let o = reader
                    .next_u64()?
                    .ok_or_else(|| Error::load(format!("truncated triple in {}", reader.path())))?;

                let s_sid = hash_mod(s, servers);
                let o_sid = hash_mod(o, servers);
                bufs[s_sid].extend_from_slice(&[s, p, o]);
                if bufs[s_sid].len() >= buf_words {
                    self.flush_triples(tid, s_sid, &mut bufs[s_sid], sent, slot_w, capacity)?;
                }
                if o_sid != s_sid {
                    bufs[o_sid].extend_from_slice(&[s, p, o]);
                    if bufs[o_sid].len() >= buf_words {
                        self.flush_triples(tid, o_sid, &mut bufs[o_sid], sent, slot_w, capacity)?;
                    }
                }
            }
        }
        for dst in 0..servers {
            if !bufs[dst].is_empty() {
                self.flush_triples(tid, dst, &mut bufs[dst], sent, slot_w, capacity)?;
            }
        }
        Ok(())
    }

    /// One-sided write of a full outbound buffer into `dst`'s staging slot
    ///
    /// The fetch-add on the per-destination counter serializes writes from
    /// this server's threads into disjoint ranges of the same slot.
    fn flush_triples(
        &self,
        tid: usize,
        dst: usize,
        buf: &mut Vec<u64>,
        sent: &[AtomicU64],
        slot_w: u64,
        capacity: u64,
    ) -> Result<()> {
        let n_new = (buf.len() / 3) as u64;
        let exist = sent[dst].fetch_add(n_new, Ordering::AcqRel);
        if exist + n_new > capacity {
            return Err(Error::load(format!(
                "staging slot for shard {dst} overflows: {} of {capacity} triples",
                exist + n_new
            )));
        }
        let off = slot_base(slot_w, self.sid) + 1 + exist * 3;
        self.remote.write(tid, dst, off, buf)?;
        buf.clear();
        Ok(())
    }

    /// All-files load: read everything, keep what this shard owns
    fn stage_allfiles(&self, dfiles: &[PathBuf]) -> Result<()> {
        let engines = self.cfg.num_engines;
        let slot_w = slot_words(self.cfg.kvstore_words, engines);
        let capacity = slot_capacity(slot_w);
        let arena = self.store.arena();

        std::thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = (0..engines)
                .map(|t| {
                    let files: Vec<PathBuf> = dfiles
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| i % engines == t)
                        .map(|(_, p)| p.clone())
                        .collect();
                    let arena = Arc::clone(&arena);
                    scope.spawn(move || self.stage_allfiles_thread(t, files, &arena, slot_w, capacity))
                })
                .collect();
            for h in handles {
                h.join().expect("stage thread panicked")?;
            }
            Ok(())
        })
    }

    fn stage_allfiles_thread(
        &self,
        t: usize,
        files: Vec<PathBuf>,
        arena: &Arena,
        slot_w: u64,
        capacity: u64,
    ) -> Result<()> {
        let servers = self.cfg.num_servers;
        let base = slot_base(slot_w, t);
        let mut n: u64 = 0;
        for path in &files {
            let mut reader = TokenReader::open(path)?;
            while let Some(s) = reader.next_u64()? {
                let p = reader
                    .next_u64()?
                    .ok_or_else(|| Error::load(format!("truncated triple in {}", reader.path())))?;
                let o = reader
                    .next_u64()?
                    .ok_or_else(|| Error::load(format!("truncated triple in {}", reader.path())))?;
                if hash_mod(s, servers) == self.sid || hash_mod(o, servers) == self.sid {
                    if n >= capacity {
                        return Err(Error::load(format!(
                            "staging partition {t} overflows: {capacity} triples"
                        )));
                    }
                    arena.write_slice(base + 1 + n * 3, &[s, p, o])?;
                    n += 1;
                }
            }
        }
        arena.store(base, n);
        Ok(())
    }

    /// Phase 2: aggregate staged triples, rebuild the store, insert
    pub fn build(&self, phase: LoadPhase) -> Result<()> {
        let start = Instant::now();
        let (pso, pos) = self.aggregate(phase.num_partitions)?;
        info!(
            sid = self.sid,
            ms = start.elapsed().as_millis() as u64,
            "aggregated triples"
        );

        let start = Instant::now();
        let attrs = self.load_attrs(&phase.attr_files)?;
        info!(
            sid = self.sid,
            ms = start.elapsed().as_millis() as u64,
            "loaded attribute files"
        );

        // staged bytes are dead from here on; reinitialize the store
        self.store.refresh();

        let start = Instant::now();
        std::thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = (0..self.cfg.num_engines)
                .map(|t| {
                    let out = &pso[t];
                    let inn = &pos[t];
                    let sav = &attrs[t];
                    scope.spawn(move || -> Result<()> {
                        self.store.insert_normal(out, inn)?;
                        self.store.insert_attr(sav)?;
                        Ok(())
                    })
                })
                .collect();
            for h in handles {
                h.join().expect("insert thread panicked")?;
            }
            Ok(())
        })?;
        info!(
            sid = self.sid,
            ms = start.elapsed().as_millis() as u64,
            "inserted normal data and attributes"
        );

        let start = Instant::now();
        self.store.insert_index()?;
        info!(
            sid = self.sid,
            ms = start.elapsed().as_millis() as u64,
            "inserted index data"
        );

        self.store.print_mem_usage();
        Ok(())
    }

    /// Scan staged partitions, deal triples to engine threads, sort, dedup
    #[allow(clippy::type_complexity)]
    fn aggregate(&self, parts: usize) -> Result<(Vec<Vec<Triple>>, Vec<Vec<Triple>>)> {
        let engines = self.cfg.num_engines;
        let slot_w = slot_words(self.cfg.kvstore_words, parts);
        let arena = self.store.arena();

        let total: u64 = (0..parts).map(|i| arena.load(slot_base(slot_w, i))).sum();

        let mut per_thread = Vec::with_capacity(engines);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..engines)
                .map(|t| {
                    let arena = Arc::clone(&arena);
                    scope.spawn(move || self.aggregate_thread(t, parts, slot_w, total, &arena))
                })
                .collect();
            for h in handles {
                per_thread.push(h.join().expect("aggregate thread panicked"));
            }
        });

        let mut pso = Vec::with_capacity(engines);
        let mut pos = Vec::with_capacity(engines);
        for r in per_thread {
            let (out, inn) = r;
            pso.push(out);
            pos.push(inn);
        }
        Ok((pso, pos))
    }

    fn aggregate_thread(
        &self,
        t: usize,
        parts: usize,
        slot_w: u64,
        total: u64,
        arena: &Arena,
    ) -> (Vec<Triple>, Vec<Triple>) {
        let servers = self.cfg.num_servers;
        let engines = self.cfg.num_engines as u64;
        let reserve = (total as usize / engines as usize) + 1;
        let mut out: Vec<Triple> = Vec::with_capacity(reserve);
        let mut inn: Vec<Triple> = Vec::with_capacity(reserve);

        for part in 0..parts {
            let base = slot_base(slot_w, part);
            let n = arena.load(base);
            for i in 0..n {
                let s: Vid = arena.load(base + 1 + i * 3);
                let p: Vid = arena.load(base + 1 + i * 3 + 1);
                let o: Vid = arena.load(base + 1 + i * 3 + 2);
                if hash_mod(s, servers) == self.sid && s % engines == t as u64 {
                    out.push(Triple::new(s, p, o));
                }
                if hash_mod(o, servers) == self.sid && o % engines == t as u64 {
                    inn.push(Triple::new(s, p, o));
                }
            }
        }

        if self.cfg.versatile {
            out.sort_by(Triple::cmp_spo);
            inn.sort_by(Triple::cmp_ops);
        } else {
            out.sort_by(Triple::cmp_pso);
            inn.sort_by(Triple::cmp_pos);
        }
        out.dedup();
        inn.dedup();
        debug!(sid = self.sid, thread = t, out = out.len(), inn = inn.len(), "aggregated partition");
        (out, inn)
    }

    /// Attribute files are always read all-files style
    fn load_attrs(&self, afiles: &[PathBuf]) -> Result<Vec<Vec<AttrTriple>>> {
        let engines = self.cfg.num_engines;
        let mut per_thread = Vec::with_capacity(engines);
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..engines)
                .map(|t| {
                    let files: Vec<PathBuf> = afiles
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| i % engines == t)
                        .map(|(_, p)| p.clone())
                        .collect();
                    scope.spawn(move || self.load_attrs_thread(files))
                })
                .collect();
            for h in handles {
                per_thread.push(h.join().expect("attr thread panicked"));
            }
        });
        per_thread.into_iter().collect()
    }

    fn load_attrs_thread(&self, files: Vec<PathBuf>) -> Result<Vec<AttrTriple>> {
        let servers = self.cfg.num_servers;
        let mut sav = Vec::new();
        for path in &files {
            let mut reader = TokenReader::open(path)?;
            while let Some(s) = reader.next_u64()? {
                let a = reader
                    .next_u64()?
                    .ok_or_else(|| Error::load(format!("truncated attribute in {}", reader.path())))?;
                let tag = reader
                    .next_u64()?
                    .ok_or_else(|| Error::load(format!("truncated attribute in {}", reader.path())))?;
                let raw = reader
                    .next_string()?
                    .ok_or_else(|| Error::load(format!("truncated attribute in {}", reader.path())))?;
                let value = match AttrValue::parse(tag as u8, &raw) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(sid = self.sid, s, a, %e, "skipping malformed attribute record");
                        continue;
                    }
                };
                if hash_mod(s, servers) == self.sid {
                    sav.push(AttrTriple::new(s, a, value));
                }
            }
        }
        Ok(sav)
    }
}
