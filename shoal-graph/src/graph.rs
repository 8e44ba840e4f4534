//! The `Graph` facade
//!
//! Presents the RDF data as a graph to the query engine: directed adjacency
//! by `(vertex, predicate, direction)`, local index lookups for start-from-
//! index steps, and typed attribute values. Lookups transparently follow a
//! vertex to its owning shard through the store's one-sided protocol.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use shoal_core::{AttrValue, ClusterConfig, Dir, StringDict, Vid, PREDICATE_ID, TYPE_ID};
use shoal_store::{Edges, GStore, RemoteMem, ThreadScratch};

use crate::dynamic::dynamic_load_data;
use crate::error::Result;
use crate::loader::Loader;

/// One server's view of the distributed graph
pub struct Graph {
    sid: usize,
    cfg: Arc<ClusterConfig>,
    store: Arc<GStore>,
    dict: Arc<RwLock<StringDict>>,
}

impl Graph {
    pub fn new(sid: usize, cfg: Arc<ClusterConfig>) -> Self {
        Self::with_dict(sid, cfg, Arc::new(RwLock::new(StringDict::new())))
    }

    pub fn with_dict(sid: usize, cfg: Arc<ClusterConfig>, dict: Arc<RwLock<StringDict>>) -> Self {
        let store = Arc::new(GStore::new(sid, Arc::clone(&cfg)));
        Self { sid, cfg, store, dict }
    }

    pub fn sid(&self) -> usize {
        self.sid
    }

    pub fn config(&self) -> &Arc<ClusterConfig> {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<GStore> {
        &self.store
    }

    pub fn dict(&self) -> &Arc<RwLock<StringDict>> {
        &self.dict
    }

    /// Attach the one-sided fabric (also used by the loader's staging)
    pub fn attach_fabric(&self, remote: Arc<dyn RemoteMem>) {
        self.store.set_remote(remote);
    }

    /// Bulk loader for this server
    pub fn loader(&self, remote: Arc<dyn RemoteMem>) -> Loader {
        Loader::new(self.sid, Arc::clone(&self.cfg), Arc::clone(&self.store), remote)
    }

    /// Adjacency lookup, following the vertex to its shard if remote
    pub fn edges<'a>(
        &'a self,
        scratch: &'a mut ThreadScratch,
        vid: Vid,
        pid: Vid,
        dir: Dir,
    ) -> Result<Edges<'a>> {
        Ok(self.store.edges_global(scratch, vid, pid, dir)?)
    }

    /// Local-only index lookup (`(0, predicate_or_type, dir)`)
    pub fn index_edges_local(&self, tpid: Vid, dir: Dir) -> Option<Edges<'_>> {
        self.store.index_edges_local(tpid, dir)
    }

    /// Attribute lookup, following the vertex to its shard if remote
    pub fn attr(
        &self,
        scratch: &mut ThreadScratch,
        vid: Vid,
        aid: Vid,
    ) -> Result<Option<AttrValue>> {
        Ok(self.store.attr_global(scratch, vid, aid)?)
    }

    /// Consistency self-check; returns the number of violations
    pub fn gstore_check(&self, index_check: bool, normal_check: bool) -> usize {
        self.store.gstore_check(index_check, normal_check)
    }

    /// Incremental load from `dname`; returns triples inserted locally
    pub fn dynamic_load(&self, dname: &str, check_dup: bool) -> Result<u64> {
        dynamic_load_data(self.sid, &self.cfg, &self.store, &self.dict, dname, check_dup)
    }

    /// Log the VERSATILE summary statistics after a load
    pub fn print_graph_stat(&self) {
        if !self.cfg.versatile {
            return;
        }
        let vertices = self
            .index_edges_local(TYPE_ID, Dir::In)
            .map_or(0, |e| e.len());
        let types = self
            .index_edges_local(TYPE_ID, Dir::Out)
            .map_or(0, |e| e.len());
        let predicates = self
            .index_edges_local(PREDICATE_ID, Dir::Out)
            .map_or(0, |e| e.len());
        info!(sid = self.sid, vertices, types, predicates, "graph statistics");
    }
}
