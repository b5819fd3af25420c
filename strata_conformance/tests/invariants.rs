// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property-style regression tests for hashing, caching, and layer-algebra
//! invariants that unit tests inside each crate don't exercise end to end.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata::{
    chain, filter, group_by, join, merge, merge_with_ids, CacheColumns, Context, DiskIndex, EdgesBag,
    LocalDirRemoteSource, MemoryCache, Pipeline,
};
use strata_algebra::AlgebraError;
use strata_cache::{CacheBackend, Reservation};
use strata_graph::vm::ValueCodec;
use strata_graph::{compile, named, BoundEdge, Edge, GraphError, JoinMode, Selector, Value};
use strata_hash::{Digest, HashValue};

fn leaf(name: &str, n: i64) -> (Box<str>, (Value, HashValue)) {
    (name.into(), (Value::new(n), HashValue::leaf(&n.to_le_bytes())))
}

fn one_input_bag(input: &str, output: &str) -> EdgesBag {
    let inc = named("conformance::inc", |args: &[Value]| {
        Value::new(args[0].downcast_ref::<i64>().copied().unwrap_or(0) + 1)
    });
    EdgesBag::new(
        vec![input.to_owned()],
        vec![output.to_owned()],
        vec![BoundEdge::new(Edge::Function(inc), vec![input.to_owned()], output.to_owned())],
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
        Context::Identity,
    )
    .expect("single-edge bag compiles")
}

struct I64Codec;

impl ValueCodec for I64Codec {
    fn encode(&self, value: &Value) -> Option<Vec<u8>> {
        value.downcast_ref::<i64>().map(|n| n.to_le_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Option<Value> {
        let bytes: [u8; 8] = bytes.try_into().ok()?;
        Some(Value::new(i64::from_le_bytes(bytes)))
    }
}

#[test]
fn cache_key_is_invariant_under_node_renaming() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let counting_inc = named("conformance::counting_inc", |args: &[Value]| {
        CALLS.fetch_add(1, Ordering::SeqCst);
        Value::new(args[0].downcast_ref::<i64>().copied().unwrap_or(0) + 1)
    });

    let pipeline_a = Pipeline::source("x")
        .cached_transform(counting_inc.clone(), vec!["x".to_owned()], "y")
        .unwrap();
    let pipeline_b = Pipeline::source("p")
        .cached_transform(counting_inc, vec!["p".to_owned()], "q")
        .unwrap();

    let cache = MemoryCache::new(8);
    let codec = I64Codec;

    let result_a = pipeline_a
        .run_cached(HashMap::from([leaf("x", 41)]), &cache, &codec)
        .unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);

    let result_b = pipeline_b
        .run_cached(HashMap::from([leaf("p", 41)]), &cache, &codec)
        .unwrap();
    // Same leaf value and same capability, but different leaf/node names:
    // the structural hash must still collide, so `counting_inc` is never
    // invoked a second time.
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(
        *result_a["y"].downcast_ref::<i64>().unwrap(),
        *result_b["q"].downcast_ref::<i64>().unwrap()
    );
}

#[test]
fn compile_reports_the_full_cycle_path() {
    let edges = vec![
        BoundEdge::new(Edge::Identity, vec!["b"], "a"),
        BoundEdge::new(Edge::Identity, vec!["a"], "b"),
    ];
    let err = compile(Vec::new(), edges, vec!["a".into()]).unwrap_err();
    match err {
        GraphError::Cycle { path } => {
            assert!(path.len() >= 2);
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[test]
fn memory_backend_grants_exactly_one_writer() {
    let cache = MemoryCache::new(8);
    let hash = HashValue::leaf(b"conformance-writer");
    assert_eq!(
        cache.reserve_write_or_read(hash.digest()).unwrap(),
        Reservation::Writer
    );

    // A second caller racing for the same key must be told to read instead
    // of write, even before the writer has finished.
    let contender = std::thread::scope(|scope| {
        scope
            .spawn(|| cache.reserve_write_or_read(hash.digest()).unwrap())
            .join()
            .unwrap()
    });
    assert_eq!(contender, Reservation::Reader);

    cache.finish_write(&hash, vec![1, 2, 3]).unwrap();
    assert_eq!(cache.get(&hash).unwrap(), Some(vec![1, 2, 3]));
}

#[test]
fn disk_backend_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let index = DiskIndex::open(dir.path()).unwrap();
    let hash = HashValue::leaf(b"conformance-reopen");

    assert_eq!(
        index.reserve_write_or_read(hash.digest()).unwrap(),
        Reservation::Writer
    );
    index.finish_write(&hash, vec![1, 2, 3]).unwrap();
    assert_eq!(index.get(&hash).unwrap(), Some(vec![1, 2, 3]));

    // Two independently-opened indices over the same root share the same
    // on-disk layout, so a second open can observe the first's writes.
    // Corruption handling itself (a mangled hash.bin reported as a clean
    // miss) is exercised where the on-disk layout is visible: see
    // `strata_cache::disk::index::tests::corrupted_hash_bin_is_reported_as_a_miss`.
    let reopened = DiskIndex::open(dir.path()).unwrap();
    assert_eq!(reopened.get(&hash).unwrap(), Some(vec![1, 2, 3]));
}

#[test]
fn disk_backend_falls_back_to_a_remote_on_a_local_miss() {
    let remote_dir = tempfile::tempdir().unwrap();
    let remote_index = DiskIndex::open(remote_dir.path()).unwrap();
    let hash = HashValue::leaf(b"conformance-remote");
    remote_index.reserve_write_or_read(hash.digest()).unwrap();
    remote_index.finish_write(&hash, vec![7, 7]).unwrap();

    let local_dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(LocalDirRemoteSource::open(remote_dir.path()).unwrap());
    let local = DiskIndex::open(local_dir.path()).unwrap().with_remotes(vec![remote]);

    // The remote, not the local index, has the value: a plain local read
    // must still surface it, and from then on without the remote.
    assert_eq!(local.get(&hash).unwrap(), Some(vec![7, 7]));
    let local_reopened = DiskIndex::open(local_dir.path()).unwrap();
    assert_eq!(local_reopened.get(&hash).unwrap(), Some(vec![7, 7]));
}

#[test]
fn cache_columns_groups_ids_into_ceil_n_over_shard_shards() {
    let columns = CacheColumns::new(4);
    let ids: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    assert_eq!(columns.shard_count(ids.len()), 3);
    assert_eq!(columns.shards(&ids).len(), 3);

    let upstream = HashValue::leaf(b"costly-column");
    let warm_up_calls = AtomicUsize::new(0);
    let mut computed_shards = HashSet::new();
    for id in &ids {
        let shard_hash = columns.shard_hash_for(&upstream, &ids, id).unwrap();
        if computed_shards.insert(shard_hash.digest()) {
            warm_up_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
    // One compute per shard, not per id.
    assert_eq!(warm_up_calls.load(Ordering::SeqCst), columns.shard_count(ids.len()));
}

#[test]
fn chain_requires_shadowed_names_to_be_forwarded() {
    let upstream = one_input_bag("raw", "clean");
    let downstream = one_input_bag("clean", "final");

    // `clean` is produced by upstream and consumed by downstream without
    // being marked virtual or persistent: chaining must reject it rather
    // than silently dropping the connection.
    let err = chain(&upstream, &downstream).unwrap_err();
    assert!(matches!(err, AlgebraError::NotForwarded { .. }));
}

#[test]
fn virtual_names_forward_only_when_unshadowed() {
    let mut upstream = one_input_bag("raw", "clean");
    upstream.virtual_names.insert("clean".to_owned());
    let downstream = one_input_bag("clean", "final");

    let combined = chain(&upstream, &downstream).expect("virtual name satisfies the dependency");
    assert!(combined.outputs.contains(&"final".to_owned()));
    // `clean` is consumed downstream, so it should not also leak through
    // as a top-level output of the combined bag.
    assert!(!combined.outputs.contains(&"clean".to_owned()));
}

struct FixedBranch(usize);

impl Selector for FixedBranch {
    fn select(&self, _args: &[Value]) -> usize {
        self.0
    }

    fn digest(&self) -> Digest {
        Digest::from_bytes([self.0 as u8; 32])
    }
}

#[test]
fn merge_routes_to_exactly_one_branch() {
    let low = one_input_bag("n", "label");
    let high = one_input_bag("n", "label");

    let merged = merge(vec![low, high], Arc::new(FixedBranch(1)), vec!["n".to_owned()])
        .expect("merge compiles");
    let compiled = compile(merged.inputs.clone(), merged.edges.clone(), merged.outputs.clone())
        .expect("merged bag compiles");

    let leaves = HashMap::from([leaf("n", 5)]);
    let vm = strata_graph::Vm::new(&compiled.graph);
    let result = vm.run(&leaves, None);
    assert_eq!(*result["label"].downcast_ref::<i64>().unwrap(), 6);
}

/// A bag with no edges at all: every declared name is both an input and an
/// output, passed straight through. Useful for algebra tests that only
/// care about name-level composition, not evaluation.
fn raw_bag(names: &[&str]) -> EdgesBag {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    EdgesBag::new(
        names.clone(),
        names,
        Vec::new(),
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
        Context::Identity,
    )
    .expect("identity bag compiles")
}

#[test]
fn merge_with_ids_rejects_overlapping_branch_ids() {
    let low = one_input_bag("n", "label");
    let high = one_input_bag("n", "label");
    let overlapping = HashSet::from(["shard-a".to_owned(), "shard-b".to_owned()]);

    let err = merge_with_ids(
        vec![
            (Pipeline::source("n").transform(named("id", |a: &[Value]| a[0].clone()), vec!["n".to_owned()], "label").unwrap().bag().clone(), overlapping.clone()),
            (Pipeline::source("n").transform(named("id", |a: &[Value]| a[0].clone()), vec!["n".to_owned()], "label").unwrap().bag().clone(), overlapping),
        ],
        "label",
        Arc::new(FixedBranch(0)),
        vec!["n".to_owned()],
    )
    .unwrap_err();

    assert!(matches!(err, AlgebraError::Conflict { .. }));
    // `low`/`high` aren't used by the id-keyed path above; keep the plain
    // `merge` variant's fixture alive so this test still documents the
    // no-id-checking baseline it's layered on top of.
    drop(low);
    drop(high);
}

#[test]
fn merge_with_ids_rejects_a_branch_missing_the_id_property() {
    let branch = Pipeline::source("n")
        .transform(named("id", |a: &[Value]| a[0].clone()), vec!["n".to_owned()], "label")
        .unwrap();

    let err = merge_with_ids(
        vec![(branch.bag().clone(), HashSet::from(["shard-a".to_owned()]))],
        "ids",
        Arc::new(FixedBranch(0)),
        vec!["n".to_owned()],
    )
    .unwrap_err();

    assert!(matches!(err, AlgebraError::MissingIdProperty { .. }));
}

#[test]
fn join_rejects_conflicting_non_join_fields() {
    let left = raw_bag(&["lk", "lv", "shared"]);
    let right = raw_bag(&["rk", "rv", "shared"]);

    let err = join(&left, "lk", "lv", &right, "rk", "rv", JoinMode::Inner, "joined").unwrap_err();
    assert!(matches!(err, AlgebraError::Conflict { .. }));
}

#[test]
fn filter_drops_impure_dependent_predicates_at_compile_time() {
    let flaky = named("conformance::flaky", |_args: &[Value]| Value::new(true));
    let bag = EdgesBag::new(
        vec!["x".to_owned()],
        vec!["x".to_owned()],
        vec![BoundEdge::new(Edge::Impure(flaky), vec!["x".to_owned()], "flag".to_owned())],
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
        Context::Identity,
    )
    .expect("impure-only bag compiles on its own");

    let predicate = named("conformance::always", |args: &[Value]| args[0].clone());
    let err = filter(&bag, predicate, vec!["flag".to_owned()], "x").unwrap_err();
    assert!(matches!(err, AlgebraError::Graph(GraphError::ImpureInFilter { .. })));
}

#[test]
fn cache_over_impure_without_allow_impure_is_a_static_error() {
    let flaky = named("conformance::flaky2", |_args: &[Value]| Value::new(1i64));
    let edges = vec![BoundEdge::new(
        Edge::Cache(Box::new(Edge::Impure(flaky)), false),
        vec!["x".to_owned()],
        "y".to_owned(),
    )];
    let err = compile(vec!["x".to_owned()], edges, vec!["y".to_owned()]).unwrap_err();
    assert!(matches!(err, GraphError::CacheOverImpure { .. }));
}

#[test]
fn group_by_collects_values_under_their_shared_key() {
    let keys = named("conformance::keys", |_args: &[Value]| {
        Value::new(vec!["a".to_owned(), "b".to_owned(), "a".to_owned()])
    });
    let values = named("conformance::values", |_args: &[Value]| {
        Value::new(vec![Value::new(1i64), Value::new(2i64), Value::new(3i64)])
    });
    let bag = EdgesBag::new(
        vec!["x".to_owned()],
        vec!["keys".to_owned(), "values".to_owned()],
        vec![
            BoundEdge::new(Edge::Function(keys), vec!["x".to_owned()], "keys".to_owned()),
            BoundEdge::new(Edge::Function(values), vec!["x".to_owned()], "values".to_owned()),
        ],
        HashSet::new(),
        HashSet::new(),
        HashSet::new(),
        Context::Identity,
    )
    .unwrap();

    let grouped_bag = group_by(&bag, "keys", "values", "grouped").unwrap();
    let compiled = compile(
        grouped_bag.inputs.clone(),
        grouped_bag.edges.clone(),
        grouped_bag.outputs.clone(),
    )
    .unwrap();
    let leaves = HashMap::from([leaf("x", 0)]);
    let vm = strata_graph::Vm::new(&compiled.graph);
    let result = vm.run(&leaves, None);
    let grouped = result["grouped"].downcast_ref::<strata_graph::Grouped>().unwrap();
    assert_eq!(grouped.groups["a"].len(), 2);
    assert_eq!(grouped.groups["b"].len(), 1);
}

#[test]
fn cached_transform_recomputes_only_on_the_first_run() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let counting_inc = named("conformance::counting_inc_repeat", |args: &[Value]| {
        CALLS.fetch_add(1, Ordering::SeqCst);
        Value::new(args[0].downcast_ref::<i64>().copied().unwrap_or(0) + 1)
    });
    let pipeline = Pipeline::source("x")
        .cached_transform(counting_inc, vec!["x".to_owned()], "y")
        .unwrap();
    let cache = MemoryCache::new(8);
    let codec = I64Codec;

    pipeline.run_cached(HashMap::from([leaf("x", 10)]), &cache, &codec).unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);

    // Same pipeline, same leaf value, second call: the cache hit must skip
    // recomputation entirely, not just reuse node identity.
    let result = pipeline
        .run_cached(HashMap::from([leaf("x", 10)]), &cache, &codec)
        .unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(*result["y"].downcast_ref::<i64>().unwrap(), 11);
}
