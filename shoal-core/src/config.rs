//! Cluster configuration
//!
//! Loaded once at process start and passed around as `Arc<ClusterConfig>`;
//! nothing reads configuration through globals. The same values must be
//! given to every server in the cluster: partitioning, store geometry and
//! the query-ID coder all derive from them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable cluster-wide configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of servers (shards) in the cluster
    pub num_servers: usize,
    /// Engine (worker) threads per server
    pub num_engines: usize,
    /// Proxy (client-facing) threads per server
    pub num_proxies: usize,

    /// Fast one-sided transport available: exchange-load at startup and
    /// in-place remote reads during execution
    pub use_rdma: bool,
    /// Minimum result rows before a step is worth fork-joining
    pub rdma_threshold: usize,
    /// Engines per server participating in an index-start fan-out
    pub mt_threshold: usize,

    /// Let idle engines drain a busy neighbor's queue
    pub enable_workstealing: bool,
    /// Attribute (vertex-attribute) patterns enabled
    pub enable_vattr: bool,
    /// VERSATILE mode: unknown-predicate kernels and the extra local
    /// indices they need
    pub versatile: bool,

    /// Directory of `id_*` / `attr_*` input files
    pub input_folder: String,

    /// Store arena budget per server, in 64-bit words
    pub kvstore_words: usize,
    /// Loader outbound buffer, in triples per destination per thread
    pub buffer_triples: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            num_servers: 1,
            num_engines: 2,
            num_proxies: 1,
            use_rdma: true,
            rdma_threshold: 300,
            mt_threshold: 2,
            enable_workstealing: false,
            enable_vattr: true,
            versatile: true,
            input_folder: String::new(),
            kvstore_words: 1 << 22,
            buffer_triples: 4096,
        }
    }
}

impl ClusterConfig {
    /// Total threads per server; proxies occupy tids `[0, num_proxies)`,
    /// engines `[num_proxies, num_proxies + num_engines)`
    pub fn num_threads(&self) -> usize {
        self.num_proxies + self.num_engines
    }

    /// First engine tid
    pub fn engine_tid_base(&self) -> usize {
        self.num_proxies
    }

    /// True if `tid` is a proxy thread
    pub fn is_proxy_tid(&self, tid: usize) -> bool {
        tid < self.num_proxies
    }

    /// Validate at startup
    pub fn validate(&self) -> Result<()> {
        if self.num_servers == 0 {
            return Err(Error::config("num_servers must be > 0"));
        }
        if self.num_engines == 0 {
            return Err(Error::config("num_engines must be > 0"));
        }
        if self.num_proxies == 0 {
            return Err(Error::config("num_proxies must be > 0"));
        }
        if self.mt_threshold == 0 || self.mt_threshold > self.num_engines {
            return Err(Error::config(format!(
                "mt_threshold must be in [1, num_engines]; got {} with {} engines",
                self.mt_threshold, self.num_engines
            )));
        }
        // an index fan-out leaves no slice for the dispatching engine, so
        // its own server needs at least one other participant
        if self.num_servers > 1 && self.mt_threshold < 2 {
            return Err(Error::config(
                "mt_threshold must be >= 2 on multi-server clusters",
            ));
        }
        if self.rdma_threshold == 0 {
            return Err(Error::config("rdma_threshold must be > 0"));
        }
        // room for headers of every staging slot plus some payload
        let min_words = self.num_servers.max(self.num_engines) * 8;
        if self.kvstore_words < min_words {
            return Err(Error::config(format!(
                "kvstore_words {} too small (minimum {min_words})",
                self.kvstore_words
            )));
        }
        if self.buffer_triples == 0 {
            return Err(Error::config("buffer_triples must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ClusterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_mt_threshold_bounds() {
        let mut cfg = ClusterConfig::default();
        cfg.mt_threshold = cfg.num_engines + 1;
        assert!(cfg.validate().is_err());
        cfg.mt_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tid_layout() {
        let cfg = ClusterConfig {
            num_proxies: 2,
            num_engines: 3,
            mt_threshold: 3,
            ..Default::default()
        };
        assert_eq!(cfg.num_threads(), 5);
        assert!(cfg.is_proxy_tid(1));
        assert!(!cfg.is_proxy_tid(2));
        assert_eq!(cfg.engine_tid_base(), 2);
    }
}
