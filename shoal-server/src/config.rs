//! Server configuration and validation
//!
//! Command-line and environment configuration for one cluster process.
//! Parsed once at startup and converted into the immutable
//! [`ClusterConfig`] every component receives.

use clap::Parser;

use shoal_core::ClusterConfig;

/// Shoal distributed RDF store server
#[derive(Parser, Debug, Clone)]
#[command(name = "shoal-server", about = "Shoal distributed RDF store server")]
pub struct ServerArgs {
    /// Directory of id_* / attr_* input files
    #[arg(long, env = "SHOAL_INPUT_FOLDER")]
    pub input_folder: String,

    /// Number of servers (shards)
    #[arg(long, env = "SHOAL_NUM_SERVERS", default_value = "1")]
    pub num_servers: usize,

    /// Engine (worker) threads per server
    #[arg(long, env = "SHOAL_NUM_ENGINES", default_value = "2")]
    pub num_engines: usize,

    /// Proxy threads per server
    #[arg(long, env = "SHOAL_NUM_PROXIES", default_value = "1")]
    pub num_proxies: usize,

    /// Use the one-sided fabric (exchange-load, in-place remote reads)
    #[arg(long, env = "SHOAL_USE_RDMA", default_value = "true")]
    pub use_rdma: bool,

    /// Minimum rows before a step fork-joins
    #[arg(long, default_value = "300")]
    pub rdma_threshold: usize,

    /// Engines per server taking part in an index-start fan-out
    #[arg(long, default_value = "2")]
    pub mt_threshold: usize,

    /// Let idle engines drain a busy neighbor's queue
    #[arg(long, default_value = "false")]
    pub enable_workstealing: bool,

    /// Enable attribute patterns
    #[arg(long, default_value = "true")]
    pub enable_vattr: bool,

    /// VERSATILE mode: unknown-predicate kernels and extra indices
    #[arg(long, default_value = "true")]
    pub versatile: bool,

    /// Store arena budget per server, in 64-bit words
    #[arg(long, default_value = "4194304")]
    pub kvstore_words: usize,

    /// Loader outbound buffer, in triples per destination per thread
    #[arg(long, default_value = "4096")]
    pub buffer_triples: usize,

    /// Run the store consistency check after loading
    #[arg(long, default_value = "false")]
    pub check_after_load: bool,
}

impl ServerArgs {
    pub fn to_cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            num_servers: self.num_servers,
            num_engines: self.num_engines,
            num_proxies: self.num_proxies,
            use_rdma: self.use_rdma,
            rdma_threshold: self.rdma_threshold,
            mt_threshold: self.mt_threshold,
            enable_workstealing: self.enable_workstealing,
            enable_vattr: self.enable_vattr,
            versatile: self.versatile,
            input_folder: self.input_folder.clone(),
            kvstore_words: self.kvstore_words,
            buffer_triples: self.buffer_triples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_convert_and_validate() {
        let args = ServerArgs::parse_from(["shoal-server", "--input-folder", "/data"]);
        let cfg = args.to_cluster_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.input_folder, "/data");
    }

    #[test]
    fn test_bad_args_fail_validation() {
        let args = ServerArgs::parse_from([
            "shoal-server",
            "--input-folder",
            "/data",
            "--mt-threshold",
            "9",
        ]);
        assert!(args.to_cluster_config().validate().is_err());
    }
}
