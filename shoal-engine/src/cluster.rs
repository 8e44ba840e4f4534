//! Single-process cluster bootstrap
//!
//! Builds S servers in one process: a graph per server, the shared-memory
//! one-sided fabric over their arenas, the channel mesh, and the engine
//! and proxy contexts. The server binary and the test suites both start
//! clusters through this; a multi-node deployment wires the same pieces to
//! real transports instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::info;

use shoal_core::ClusterConfig;
use shoal_graph::Graph;
use shoal_net::{Mesh, SharedMem};

use crate::driver::Engine;
use crate::error::Result;
use crate::proxy::Proxy;
use crate::worker::run_engine;

/// A running (or startable) in-process cluster
pub struct Cluster {
    cfg: Arc<ClusterConfig>,
    graphs: Vec<Arc<Graph>>,
    engines: Vec<Vec<Arc<Engine>>>,
    proxies: Vec<Vec<Arc<Proxy>>>,
    remote: Arc<SharedMem>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Cluster {
    /// Wire up stores, fabric, mesh, engines and proxies (no threads yet)
    pub fn build(cfg: ClusterConfig) -> Result<Self> {
        cfg.validate().map_err(shoal_graph::Error::Core)?;
        let cfg = Arc::new(cfg);

        let mesh = Mesh::new(Arc::clone(&cfg));
        let graphs: Vec<Arc<Graph>> = (0..cfg.num_servers)
            .map(|sid| Arc::new(Graph::new(sid, Arc::clone(&cfg))))
            .collect();

        let arenas = graphs.iter().map(|g| g.store().arena()).collect();
        let remote = SharedMem::new(arenas);
        for g in &graphs {
            g.attach_fabric(remote.clone());
        }

        let epoch = Instant::now();
        let mut engines = Vec::with_capacity(cfg.num_servers);
        let mut proxies = Vec::with_capacity(cfg.num_servers);
        for sid in 0..cfg.num_servers {
            let mut server_engines = Vec::with_capacity(cfg.num_engines);
            for e in 0..cfg.num_engines {
                let tid = cfg.engine_tid_base() + e;
                server_engines.push(Arc::new(Engine::new(
                    sid,
                    tid,
                    Arc::clone(&cfg),
                    Arc::clone(&graphs[sid]),
                    mesh.adaptor(sid, tid),
                    epoch,
                )));
            }
            engines.push(server_engines);

            let mut server_proxies = Vec::with_capacity(cfg.num_proxies);
            for tid in 0..cfg.num_proxies {
                server_proxies.push(Arc::new(Proxy::new(
                    sid,
                    tid,
                    Arc::clone(&cfg),
                    mesh.adaptor(sid, tid),
                )));
            }
            proxies.push(server_proxies);
        }

        Ok(Self {
            cfg,
            graphs,
            engines,
            proxies,
            remote,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        })
    }

    /// Bulk-load every server: all stage, barrier, all build
    pub fn load(&self) -> Result<()> {
        let mut phases = Vec::with_capacity(self.graphs.len());
        for g in &self.graphs {
            phases.push(g.loader(self.remote.clone()).stage()?);
        }
        for (g, phase) in self.graphs.iter().zip(phases) {
            g.loader(self.remote.clone()).build(phase)?;
            g.print_graph_stat();
        }
        Ok(())
    }

    /// Spawn every engine thread
    pub fn start(&mut self) {
        for sid in 0..self.cfg.num_servers {
            let server_engines = self.engines[sid].clone();
            for own_idx in 0..server_engines.len() {
                let server_engines = server_engines.clone();
                let shutdown = Arc::clone(&self.shutdown);
                self.handles.push(std::thread::spawn(move || {
                    run_engine(&server_engines, own_idx, &shutdown);
                }));
            }
        }
        info!(
            servers = self.cfg.num_servers,
            engines = self.cfg.num_engines,
            proxies = self.cfg.num_proxies,
            "cluster started"
        );
    }

    pub fn config(&self) -> &Arc<ClusterConfig> {
        &self.cfg
    }

    pub fn graph(&self, sid: usize) -> &Arc<Graph> {
        &self.graphs[sid]
    }

    pub fn proxy(&self, sid: usize, idx: usize) -> &Arc<Proxy> {
        &self.proxies[sid][idx]
    }

    /// Signal shutdown and join every engine thread
    pub fn stop(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!("cluster stopped");
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.stop();
    }
}
