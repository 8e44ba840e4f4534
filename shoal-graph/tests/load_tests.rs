//! Loader laws: partition completeness, adjacency correctness, index
//! completeness, the exchange/all-files equivalence, attribute loading and
//! incremental load.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use tempfile::TempDir;

use shoal_core::{hash_mod, AttrValue, ClusterConfig, Dir, Vid, TYPE_ID};
use shoal_graph::Graph;
use shoal_net::SharedMem;

const KNOWS: Vid = 100;
const AGE: Vid = 200;
const PERSON: Vid = 300;

fn write_lines(dir: &TempDir, name: &str, lines: &[String]) {
    let mut f = File::create(dir.path().join(name)).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
}

fn triple_lines(triples: &[(Vid, Vid, Vid)]) -> Vec<String> {
    triples.iter().map(|(s, p, o)| format!("{s} {p} {o}")).collect()
}

/// Build S graphs over `dir`, run the two load phases, return them
fn load_cluster(dir: &TempDir, num_servers: usize, use_rdma: bool) -> Vec<Arc<Graph>> {
    let cfg = Arc::new(ClusterConfig {
        num_servers,
        num_engines: 2,
        num_proxies: 1,
        mt_threshold: 2,
        use_rdma,
        input_folder: dir.path().to_string_lossy().to_string(),
        kvstore_words: 1 << 16,
        buffer_triples: 8,
        ..Default::default()
    });
    cfg.validate().unwrap();

    let graphs: Vec<Arc<Graph>> = (0..num_servers)
        .map(|sid| Arc::new(Graph::new(sid, Arc::clone(&cfg))))
        .collect();
    let remote = SharedMem::new(graphs.iter().map(|g| g.store().arena()).collect());
    for g in &graphs {
        g.attach_fabric(remote.clone());
    }

    let phases: Vec<_> = graphs
        .iter()
        .map(|g| g.loader(remote.clone()).stage().unwrap())
        .collect();
    for (g, phase) in graphs.iter().zip(phases) {
        g.loader(remote.clone()).build(phase).unwrap();
    }
    graphs
}

fn sample_triples() -> Vec<(Vid, Vid, Vid)> {
    let mut triples = vec![
        (10, KNOWS, 11),
        (10, KNOWS, 12),
        (11, KNOWS, 12),
        (12, KNOWS, 10),
        (10, TYPE_ID, PERSON),
        (11, TYPE_ID, PERSON),
        (10, KNOWS, 11), // duplicate on purpose
    ];
    // some wider spread so both shards hold data
    for v in 20..40u64 {
        triples.push((v, KNOWS, v + 1));
    }
    triples
}

#[test]
fn test_partition_completeness_and_adjacency() {
    let dir = TempDir::new().unwrap();
    let triples = sample_triples();
    write_lines(&dir, "id_0", &triple_lines(&triples));

    let graphs = load_cluster(&dir, 2, true);

    // every (s, p) has its OUT list on exactly the owner of s, equal to
    // the sorted, deduplicated object set
    let mut by_sp: std::collections::HashMap<(Vid, Vid), Vec<Vid>> = Default::default();
    let mut by_op: std::collections::HashMap<(Vid, Vid), Vec<Vid>> = Default::default();
    for &(s, p, o) in &triples {
        by_sp.entry((s, p)).or_default().push(o);
        by_op.entry((o, p)).or_default().push(s);
    }

    for ((s, p), mut objs) in by_sp {
        objs.sort_unstable();
        objs.dedup();
        let owner = hash_mod(s, 2);
        for (sid, g) in graphs.iter().enumerate() {
            let got = g.store().edges_local(s, p, Dir::Out).map(|e| {
                let mut v = e.to_vec();
                v.sort_unstable();
                v
            });
            if sid == owner {
                assert_eq!(got.as_deref(), Some(objs.as_slice()), "OUT list of ({s},{p})");
            } else {
                assert!(got.is_none(), "non-owner {sid} holds OUT list of ({s},{p})");
            }
        }
    }

    for ((o, p), mut subs) in by_op {
        subs.sort_unstable();
        subs.dedup();
        let owner = hash_mod(o, 2);
        let got = graphs[owner].store().edges_local(o, p, Dir::In).map(|e| {
            let mut v = e.to_vec();
            v.sort_unstable();
            v
        });
        assert_eq!(got.as_deref(), Some(subs.as_slice()), "IN list of ({o},{p})");
    }
}

#[test]
fn test_index_completeness() {
    let dir = TempDir::new().unwrap();
    let triples = sample_triples();
    write_lines(&dir, "id_0", &triple_lines(&triples));

    let graphs = load_cluster(&dir, 2, true);

    // predicate index: union of per-server subject lists covers every
    // subject exactly once
    let mut expected: Vec<Vid> = triples
        .iter()
        .filter(|(_, p, _)| *p == KNOWS)
        .map(|&(s, _, _)| s)
        .collect();
    expected.sort_unstable();
    expected.dedup();

    let mut got: Vec<Vid> = Vec::new();
    for g in &graphs {
        if let Some(e) = g.index_edges_local(KNOWS, Dir::Out) {
            got.extend(e.iter());
        }
    }
    got.sort_unstable();
    let deduped = {
        let mut d = got.clone();
        d.dedup();
        d
    };
    assert_eq!(got, deduped, "a subject appears in more than one shard's index");
    assert_eq!(got, expected);

    // type index: instances of PERSON
    let mut people: Vec<Vid> = Vec::new();
    for g in &graphs {
        if let Some(e) = g.index_edges_local(PERSON, Dir::In) {
            people.extend(e.iter());
        }
    }
    people.sort_unstable();
    assert_eq!(people, vec![10, 11]);

    // and the stores agree with themselves
    for g in &graphs {
        assert_eq!(g.gstore_check(true, true), 0);
    }
}

#[test]
fn test_exchange_equals_allfiles() {
    let dir = TempDir::new().unwrap();
    let triples = sample_triples();
    write_lines(&dir, "id_0", &triple_lines(&triples));

    let with_rdma = load_cluster(&dir, 2, true);
    let without = load_cluster(&dir, 2, false);

    for &(s, p, _) in &triples {
        let owner = hash_mod(s, 2);
        let a = with_rdma[owner]
            .store()
            .edges_local(s, p, Dir::Out)
            .map(|e| e.to_vec());
        let b = without[owner]
            .store()
            .edges_local(s, p, Dir::Out)
            .map(|e| e.to_vec());
        assert_eq!(a, b, "load strategies disagree on ({s},{p})");
    }
}

#[test]
fn test_attribute_load_skips_malformed() {
    let dir = TempDir::new().unwrap();
    write_lines(&dir, "id_0", &triple_lines(&[(10, KNOWS, 11)]));
    write_lines(
        &dir,
        "attr_0",
        &[
            "11 200 1 25".to_string(),
            "12 200 3 2.5".to_string(),
            "13 200 9 7".to_string(), // bad type tag, skipped
            "14 200 2 1.5".to_string(),
        ],
    );

    let graphs = load_cluster(&dir, 2, true);
    let find = |v: Vid| {
        let owner = hash_mod(v, 2);
        graphs[owner].store().attr_local(v, AGE)
    };
    assert_eq!(find(11), Some(AttrValue::Int(25)));
    assert_eq!(find(12), Some(AttrValue::Double(2.5)));
    assert_eq!(find(13), None);
    assert_eq!(find(14), Some(AttrValue::Float(1.5)));
}

#[test]
fn test_incremental_load_with_remapping() {
    let base = TempDir::new().unwrap();
    write_lines(&base, "id_0", &triple_lines(&[(10, KNOWS, 11)]));
    let graphs = load_cluster(&base, 2, true);

    // seed the dictionaries the way the string server would at startup
    for g in &graphs {
        let mut dict = g.dict().write();
        dict.insert("knows", KNOWS, shoal_core::dict::IdSpace::Index);
        dict.insert("<alice>", 10, shoal_core::dict::IdSpace::Normal);
        dict.insert("<bob>", 11, shoal_core::dict::IdSpace::Normal);
    }

    // the incremental directory speaks an external ID space: knows=7,
    // alice=1, bob=2, carol=3 (carol is new to the dictionary)
    let inc = TempDir::new().unwrap();
    write_lines(&inc, "str_index", &["knows 7".to_string()]);
    write_lines(
        &inc,
        "str_normal",
        &[
            "<alice> 1".to_string(),
            "<bob> 2".to_string(),
            "<carol> 3".to_string(),
        ],
    );
    write_lines(&inc, "id_0", &triple_lines(&[(2, 7, 3), (1, 7, 2)]));

    let dname = inc.path().to_string_lossy().to_string();
    for g in &graphs {
        g.dynamic_load(&dname, true).unwrap();
    }

    // carol got a fresh internal ID on every server identically
    let carol = graphs[0].dict().read().str2id("<carol>").unwrap();
    for g in &graphs {
        assert_eq!(g.dict().read().str2id("<carol>"), Some(carol));
    }

    // bob -> carol landed under internal IDs
    let owner = hash_mod(11, 2);
    let objs = graphs[owner]
        .store()
        .edges_local(11, KNOWS, Dir::Out)
        .unwrap()
        .to_vec();
    assert!(objs.contains(&carol));

    // alice -> bob already existed; duplicate suppression kept one copy
    let owner = hash_mod(10, 2);
    let objs = graphs[owner]
        .store()
        .edges_local(10, KNOWS, Dir::Out)
        .unwrap()
        .to_vec();
    assert_eq!(objs.iter().filter(|&&o| o == 11).count(), 1);

    for g in &graphs {
        assert_eq!(g.gstore_check(true, true), 0);
    }
}
