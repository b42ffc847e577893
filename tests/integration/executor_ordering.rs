mod support;

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::Mutex;
use sombra_executor::{
    DirectedEdge, EntityId, Executor, ExecutorOptions, MemStore, MutationContext, StartTs,
    Submission,
};
use support::LedgerStore;

fn opts(lanes: usize) -> ExecutorOptions {
    ExecutorOptions::new().lane_count(lanes).mailbox_capacity(16)
}

#[test]
fn same_key_across_calls_keeps_submission_order() {
    let store = Arc::new(MemStore::new());
    let executor = Executor::start(Arc::clone(&store), opts(8)).unwrap();
    let ctx = MutationContext::background();

    let first = executor.submit(&ctx, StartTs(100), vec![DirectedEdge::set(42u64, "name", "a")]);
    let second = executor.submit(&ctx, StartTs(101), vec![DirectedEdge::set(42u64, "name", "b")]);
    assert!(matches!(first, Submission::Accepted { sub_batches: 1, .. }));
    assert!(matches!(second, Submission::Accepted { sub_batches: 1, .. }));
    executor.shutdown();

    let versions = store.versions("name", EntityId(42));
    let seen: Vec<(u64, &[u8])> = versions
        .iter()
        .map(|v| (v.start_ts.0, v.value.as_ref()))
        .collect();
    assert_eq!(seen, vec![(100, &b"a"[..]), (101, &b"b"[..])]);
    assert_eq!(store.get("name", EntityId(42)).unwrap(), b"b".to_vec());
}

#[test]
fn same_key_within_one_call_keeps_slice_order() {
    let store = Arc::new(LedgerStore::new());
    let executor = Executor::start(Arc::clone(&store), opts(4)).unwrap();
    let edges: Vec<_> = (0..10u32)
        .flat_map(|i| {
            [
                DirectedEdge::set(7u64, "count", i.to_string()),
                DirectedEdge::set(u64::from(i) + 1_000, "other", "x"),
            ]
        })
        .collect();
    executor.submit(&MutationContext::background(), StartTs(1), edges);
    executor.shutdown();

    let values: Vec<Bytes> = store.values_for(7, "count");
    let expected: Vec<Bytes> = (0..10u32).map(|i| Bytes::from(i.to_string())).collect();
    assert_eq!(values, expected);
}

#[test]
fn each_submitter_sees_its_keys_in_order() {
    const SUBMITTERS: u64 = 6;
    const BATCHES: u64 = 50;

    let store = Arc::new(LedgerStore::new());
    let executor = Arc::new(Executor::start(Arc::clone(&store), opts(4)).unwrap());
    let handles: Vec<_> = (0..SUBMITTERS)
        .map(|worker| {
            let executor = Arc::clone(&executor);
            thread::spawn(move || {
                let ctx = MutationContext::background().with_request_id(worker);
                for seq in 0..BATCHES {
                    let edges = vec![
                        DirectedEdge::set(worker, "seq", seq.to_be_bytes().to_vec()),
                        DirectedEdge::set(worker + 100, "seq", seq.to_be_bytes().to_vec()),
                        DirectedEdge::link(worker, "follows", EntityId(seq % 3)),
                    ];
                    executor.submit(&ctx, StartTs(worker * 1_000 + seq), edges);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    executor.shutdown();

    for worker in 0..SUBMITTERS {
        for entity in [worker, worker + 100] {
            let seen: Vec<u64> = store
                .values_for(entity, "seq")
                .iter()
                .map(|v| u64::from_be_bytes(v[..].try_into().unwrap()))
                .collect();
            assert_eq!(seen, (0..BATCHES).collect::<Vec<_>>(), "entity {entity}");
        }
    }
}

#[test]
fn contended_key_follows_global_submission_order() {
    const SUBMITTERS: usize = 4;
    const ROUNDS: usize = 40;

    let store = Arc::new(LedgerStore::new());
    let executor = Arc::new(Executor::start(Arc::clone(&store), opts(8)).unwrap());
    // Serializes submits so "submitted before" is well defined across threads.
    let sequencer = Arc::new(Mutex::new(0u64));
    let handles: Vec<_> = (0..SUBMITTERS)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || {
                let ctx = MutationContext::background();
                for _ in 0..ROUNDS {
                    let mut next = sequencer.lock();
                    *next += 1;
                    let edge = DirectedEdge::set(42u64, "name", next.to_be_bytes().to_vec());
                    executor.submit(&ctx, StartTs(*next), vec![edge]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    executor.shutdown();

    let seen: Vec<u64> = store
        .values_for(42, "name")
        .iter()
        .map(|v| u64::from_be_bytes(v[..].try_into().unwrap()))
        .collect();
    let expected: Vec<u64> = (1..=(SUBMITTERS * ROUNDS) as u64).collect();
    assert_eq!(seen, expected);
}

#[test]
fn single_lane_serializes_everything() {
    let store = Arc::new(LedgerStore::new());
    let executor = Executor::start(Arc::clone(&store), opts(1)).unwrap();
    let ctx = MutationContext::background();
    for ts in 1..=20u64 {
        let edges = vec![
            DirectedEdge::set(ts, "a", "x"),
            DirectedEdge::set(ts + 1, "b", "y"),
        ];
        let outcome = executor.submit(&ctx, StartTs(ts), edges);
        assert!(matches!(outcome, Submission::Accepted { sub_batches: 1, .. }));
    }
    executor.shutdown();
    let committed: Vec<u64> = store.committed_timestamps().iter().map(|ts| ts.0).collect();
    assert_eq!(committed, (1..=20).collect::<Vec<_>>());
    assert_eq!(store.waits(), 20);
}
