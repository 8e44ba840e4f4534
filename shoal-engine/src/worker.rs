//! The per-engine scheduler loop
//!
//! Priorities per iteration: the fast-path queue (sub-queries this engine
//! enqueued for itself), a sweep of backpressured sends, the engine's own
//! transport queue (urgent queries run at once, fresh ones queue behind),
//! then the deferred queue, then — when enabled — stealing from the paired
//! neighbor engine if its heartbeat is stale. An idle iteration snoozes,
//! doubling from 10 µs to 80 µs, but only after 10 s of fruitless busy
//! polling; any message resets the snooze.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shoal_query::Bundle;
use shoal_store::ThreadScratch;

use crate::driver::Engine;

/// Busy-poll this long before starting to snooze (µs)
pub const BUSY_POLLING_THRESHOLD_US: u64 = 10_000_000;
/// Initial and minimum snooze (µs)
pub const MIN_SNOOZE_US: u64 = 10;
/// Snooze cap (µs)
pub const MAX_SNOOZE_US: u64 = 80;
/// A neighbor whose heartbeat is older than this is busy enough to steal
/// from (µs)
pub const TIMEOUT_THRESHOLD_US: u64 = 10_000;

/// Run one engine until the cluster shuts down
///
/// `server_engines` is this server's engine table in engine-index order;
/// `own_idx` is this engine's index in it. The work-stealing pair is the
/// mirror index.
pub fn run_engine(server_engines: &[Arc<Engine>], own_idx: usize, shutdown: &AtomicBool) {
    let engine = &server_engines[own_idx];
    let nbr_idx = (server_engines.len() - 1) - own_idx;
    let cfg = Arc::clone(engine.config());
    let mut scratch = ThreadScratch::new(engine.global_thread_index());

    let mut last_recv = engine.now_usec();
    let mut snooze_us = MIN_SNOOZE_US;

    while !shutdown.load(Ordering::Acquire) {
        let mut has_msg = false;

        // fast path first: self-enqueued sub-queries keep the pipeline warm
        engine.touch();
        if let Some(q) = engine.pop_fast_path() {
            has_msg = true;
            snooze_us = MIN_SNOOZE_US;
            last_recv = engine.now_usec();
            engine.execute_sparql_query(q, engine, &mut scratch);
            continue;
        }

        engine.sweep_pending();

        // own transport queue
        engine.touch();
        while let Some(bundle) = engine.adaptor().try_recv() {
            match bundle {
                Bundle::Sparql(q) if q.is_request() && q.priority == 0 => {
                    // fresh client work waits behind urgent sub-query traffic
                    engine.push_new_queue(q);
                }
                other => {
                    has_msg = true;
                    snooze_us = MIN_SNOOZE_US;
                    last_recv = engine.now_usec();
                    engine.execute_bundle(other, engine, &mut scratch);
                    break;
                }
            }
        }

        if !has_msg {
            if let Some(q) = engine.pop_new_queue() {
                has_msg = true;
                snooze_us = MIN_SNOOZE_US;
                last_recv = engine.now_usec();
                engine.execute_sparql_query(q, engine, &mut scratch);
            }
        }

        // work-stealing: drain a stalled neighbor, merging replies through
        // the neighbor's own reply map
        if cfg.enable_workstealing && nbr_idx != own_idx {
            engine.touch();
            let nbr = &server_engines[nbr_idx];
            if engine.now_usec() >= nbr.last_time_usec() + TIMEOUT_THRESHOLD_US {
                if let Some(bundle) = nbr.adaptor().try_recv() {
                    has_msg = true;
                    snooze_us = MIN_SNOOZE_US;
                    last_recv = engine.now_usec();
                    engine.execute_bundle(bundle, nbr, &mut scratch);
                }
            }
        }

        if has_msg {
            continue;
        }

        // release the core once busy polling has gone stale
        if snooze_us > MIN_SNOOZE_US || engine.now_usec() - last_recv > BUSY_POLLING_THRESHOLD_US {
            std::thread::sleep(Duration::from_micros(snooze_us));
            if snooze_us < MAX_SNOOZE_US {
                snooze_us *= 2;
            }
        }
    }
}
