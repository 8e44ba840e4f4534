//! Shoal server entry point
//!
//! Parses configuration, initializes logging, boots a single-process
//! cluster (one shard per configured server), loads the input data, and
//! serves until terminated. The query surface in front of the proxies
//! (parser, REPL, HTTP) is out of scope; deployments attach their own.

mod config;

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shoal_engine::Cluster;

use crate::config::ServerArgs;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    let cfg = args.to_cluster_config();
    if let Err(e) = cfg.validate() {
        error!(%e, "invalid configuration");
        std::process::exit(1);
    }

    let mut cluster = match Cluster::build(cfg) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "failed to build cluster");
            std::process::exit(1);
        }
    };

    if let Err(e) = cluster.load() {
        error!(%e, "failed to load input data");
        std::process::exit(1);
    }

    cluster.start();

    if args.check_after_load {
        match cluster
            .proxy(0, 0)
            .run_gstore_check(true, true, Duration::from_secs(300))
        {
            Ok(0) => info!("gstore check passed"),
            Ok(errors) => error!(errors, "gstore check found violations"),
            Err(e) => error!(%e, "gstore check failed to run"),
        }
    }

    info!("shoal-server is serving; press Ctrl-C to stop");
    loop {
        std::thread::park();
    }
}
