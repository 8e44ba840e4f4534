//! Incremental load into a live store
//!
//! The load directory carries dictionary extension files (`str_index`,
//! `str_normal`) in the external ID space plus `id_*` / `attr_*` files.
//! The extension files build a transient `id2id` remap: strings the
//! dictionary already knows keep their internal IDs, unseen strings get
//! fresh IDs from the matching counter. Triples are rewritten through the
//! remap and inserted on their owning shards; unknown IDs are logged and
//! kept, never fatal. The remap is dropped when the load completes.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use shoal_core::dict::IdSpace;
use shoal_core::{hash_mod, AttrTriple, AttrValue, ClusterConfig, StringDict, Triple, Vid};
use shoal_store::GStore;

use crate::error::{Error, Result};
use crate::files::{list_files, TokenReader};

/// Run an incremental load; returns the number of triples inserted locally
pub fn dynamic_load_data(
    sid: usize,
    cfg: &Arc<ClusterConfig>,
    store: &Arc<GStore>,
    dict: &Arc<RwLock<StringDict>>,
    dname: &str,
    check_dup: bool,
) -> Result<u64> {
    let id2id = load_id_mappings(dict, dname)?;

    let dfiles = list_files(dname, "id_")?;
    let afiles = list_files(dname, "attr_")?;
    if dfiles.is_empty() && afiles.is_empty() {
        warn!(sid, dname, "no files found for incremental load");
        return Ok(0);
    }
    info!(
        sid,
        data_files = dfiles.len(),
        attr_files = afiles.len(),
        dname,
        "incremental load starting"
    );

    let remap = |id: Vid| -> Vid { id2id.get(&id).copied().unwrap_or(id) };
    let check_known = |id: Vid| {
        if !dict.read().exist_id(id) {
            warn!(sid, id, "unknown SID during incremental load");
        }
    };

    let start = Instant::now();
    let inserted = AtomicU64::new(0);
    let engines = cfg.num_engines;
    std::thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = (0..engines)
            .map(|t| {
                let files: Vec<PathBuf> = dfiles
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| i % engines == t)
                    .map(|(_, p)| p.clone())
                    .collect();
                let inserted = &inserted;
                let remap = &remap;
                let check_known = &check_known;
                scope.spawn(move || -> Result<()> {
                    let mut cnt = 0u64;
                    for path in &files {
                        let mut reader = TokenReader::open(path)?;
                        while let Some(s_raw) = reader.next_u64()? {
                            let p_raw = reader.next_u64()?.ok_or_else(|| {
                                Error::load(format!("truncated triple in {}", reader.path()))
                            })?;
                            let o_raw = reader.next_u64()?.ok_or_else(|| {
                                Error::load(format!("truncated triple in {}", reader.path()))
                            })?;
                            let t = Triple::new(remap(s_raw), remap(p_raw), remap(o_raw));
                            check_known(t.s);
                            check_known(t.p);
                            check_known(t.o);

                            if hash_mod(t.s, cfg.num_servers) == sid {
                                store.insert_triple_out(t, check_dup)?;
                                cnt += 1;
                            }
                            if hash_mod(t.o, cfg.num_servers) == sid {
                                store.insert_triple_in(t, check_dup)?;
                                cnt += 1;
                            }
                        }
                    }
                    inserted.fetch_add(cnt, Ordering::AcqRel);
                    Ok(())
                })
            })
            .collect();
        for h in handles {
            h.join().expect("incremental load thread panicked")?;
        }
        Ok(())
    })?;

    // attribute files, remapped the same way
    for path in &afiles {
        let mut reader = TokenReader::open(path)?;
        while let Some(s_raw) = reader.next_u64()? {
            let a_raw = reader
                .next_u64()?
                .ok_or_else(|| Error::load(format!("truncated attribute in {}", reader.path())))?;
            let tag = reader
                .next_u64()?
                .ok_or_else(|| Error::load(format!("truncated attribute in {}", reader.path())))?;
            let raw = reader
                .next_string()?
                .ok_or_else(|| Error::load(format!("truncated attribute in {}", reader.path())))?;
            let s = remap(s_raw);
            let a = remap(a_raw);
            check_known(s);
            check_known(a);
            let value = match AttrValue::parse(tag as u8, &raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!(sid, s, a, %e, "skipping malformed attribute record");
                    continue;
                }
            };
            if hash_mod(s, cfg.num_servers) == sid {
                store.insert_attr_single(AttrTriple::new(s, a, value))?;
                inserted.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    let total = inserted.load(Ordering::Acquire);
    info!(
        sid,
        triples = total,
        ms = start.elapsed().as_millis() as u64,
        "incremental load finished"
    );
    // id2id drops here: the remap only lives for the duration of a load
    Ok(total)
}

/// Build the external→internal ID remap from the extension files
fn load_id_mappings(dict: &Arc<RwLock<StringDict>>, dname: &str) -> Result<HashMap<Vid, Vid>> {
    let mut id2id: HashMap<Vid, Vid> = HashMap::new();
    if dname.starts_with("hdfs:") {
        return Err(Error::load(format!(
            "ID-mapping directory {dname} is on HDFS but this build has no HDFS support"
        )));
    }
    let entries = std::fs::read_dir(dname)
        .map_err(|e| Error::load(format!("failed to open ID-mapping directory {dname}: {e}")))?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dname, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy().to_string();
        let space = match name.as_str() {
            "str_index" => IdSpace::Index,
            "str_normal" => IdSpace::Normal,
            _ => continue,
        };
        info!(file = %entry.path().display(), "loading ID-mapping file");

        let mut reader = TokenReader::open(&entry.path())?;
        let mut guard = dict.write();
        while let Some(s) = reader.next_string()? {
            let ext_id = reader
                .next_u64()?
                .ok_or_else(|| Error::load(format!("truncated mapping in {}", reader.path())))?;
            let internal = guard.get_or_insert(&s, space);
            id2id.insert(ext_id, internal);
        }
    }
    Ok(id2id)
}
