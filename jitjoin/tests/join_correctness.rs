//! End-to-end tests: build the join IR, compile it with each backend and
//! check the populated output array and match count.

use std::time::Instant;

use jitjoin::{
    build_join_ir, run_join, BackendState, CompilationBackend, InterpBackend, JitEngine, JitError,
    JoinOutput, JoinParams, StringColumn, Table,
};

const NOT_FOUND: &str = "Not Found";

fn join_with<B: CompilationBackend>(mut backend: B, left: &[&str], right: &[&str]) -> JoinOutput {
    backend.initialize().unwrap();
    let entry = backend
        .compile(&build_join_ir(&JoinParams::default()).unwrap())
        .unwrap();
    let left = StringColumn::from_values(left).unwrap();
    let right = StringColumn::from_values(right).unwrap();
    let output = run_join(&entry, &left, &right).unwrap();
    backend.shutdown();
    output
}

/// Runs both backends and checks they agree before handing back the result.
fn join(left: &[&str], right: &[&str]) -> JoinOutput {
    let native = join_with(JitEngine::default(), left, right);
    let interp = join_with(InterpBackend::new(), left, right);
    assert_eq!(native, interp, "native and interpreted joins disagree");
    native
}

#[test]
fn test_identical_distinct_arrays() {
    let keys = ["k1", "k2", "k3", "k4"];
    let out = join(&keys, &keys);

    // One equal pair per `a`.
    assert_eq!(out.matches, keys.len() as i32);
    assert_eq!(out.slots.len(), keys.len() + 1);
    assert_eq!(out.slot(0), None);
    // The last `b` iteration decides each slot.
    for slot in 1..keys.len() {
        assert_eq!(out.slot(slot), Some(NOT_FOUND), "slot {slot}");
    }
    assert_eq!(out.slot(keys.len()), Some("k4"));
}

#[test]
fn test_single_row_identical_arrays_copy_value() {
    let out = join(&["only"], &["only"]);
    assert_eq!(out.matches, 1);
    assert_eq!(out.slot(1), Some("only"));
}

#[test]
fn test_disjoint_arrays() {
    let out = join(&["a", "b", "c"], &["x", "y", "z"]);
    assert_eq!(out.matches, 0);
    assert!(out.results().all(|r| r == Some(NOT_FOUND.as_bytes())));
}

#[test]
fn test_counter_diverges_from_output() {
    let out = join(&["x", "y"], &["y", "z"]);
    assert_eq!(out.matches, 1);
    assert_eq!(
        out.slots,
        vec![None, Some(NOT_FOUND.into()), Some(NOT_FOUND.into())]
    );
}

#[test]
fn test_every_equal_pair_is_counted() {
    let out = join(&["x", "x", "x"], &["x", "x", "x"]);
    assert_eq!(out.matches, 9);
    assert!(out.results().all(|r| r == Some(b"x".as_slice())));
}

#[test]
fn test_content_equality_across_distinct_buffers() {
    // Separate allocations with equal content still match.
    let left = vec!["same".to_string()];
    let right = vec![String::from("sa") + "me"];
    let left: Vec<&str> = left.iter().map(String::as_str).collect();
    let right: Vec<&str> = right.iter().map(String::as_str).collect();
    let out = join(&left, &right);
    assert_eq!(out.matches, 1);
    assert_eq!(out.slot(1), Some("same"));
}

#[test]
fn test_non_utf8_keys_join_bytewise() {
    let left = Table::parse(b"id,key\n1,caf\xe9\n2,caf\xe8\n");
    let right = Table::parse(b"id,key\n1,caf\xe8\n2,caf\xe9\n");
    let left = StringColumn::from_table(&left, 1).unwrap();
    let right = StringColumn::from_table(&right, 1).unwrap();

    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let func = build_join_ir(&JoinParams::default()).unwrap();
    let native = run_join(&engine.compile(&func).unwrap(), &left, &right).unwrap();

    let mut interp = InterpBackend::new();
    interp.initialize().unwrap();
    let reference = run_join(&interp.compile(&func).unwrap(), &left, &right).unwrap();
    assert_eq!(native, reference);

    // Each left key matches one right key; only the first row matches on
    // the last inner iteration.
    assert_eq!(native.matches, 2);
    assert_eq!(native.slot_bytes(1), Some(b"caf\xe9".as_slice()));
    assert_eq!(native.slot_bytes(2), Some(NOT_FOUND.as_bytes()));
    assert_eq!(native.slot(1), None);
}

#[test]
fn test_empty_columns_run_no_iterations() {
    // N = 1: only the reserved slot.
    let out = join(&[], &[]);
    assert_eq!(out.matches, 0);
    assert_eq!(out.slots, vec![None]);

    // N = 0: nothing at all.
    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let entry = engine
        .compile(&build_join_ir(&JoinParams::default()).unwrap())
        .unwrap();
    let empty = StringColumn::from_table(&Table::default(), 0).unwrap();
    let out = run_join(&entry, &empty, &empty).unwrap();
    assert_eq!(out.matches, 0);
    assert!(out.slots.is_empty());
}

#[test]
fn test_idempotent_invocation() {
    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let entry = engine
        .compile(&build_join_ir(&JoinParams::default()).unwrap())
        .unwrap();
    let left = StringColumn::from_values(["p", "q", "r"]).unwrap();
    let right = StringColumn::from_values(["r", "q", "p"]).unwrap();

    let first = run_join(&entry, &left, &right).unwrap();
    let second = run_join(&entry, &left, &right).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.matches, 3);
}

#[test]
fn test_custom_not_found_marker() {
    let params = JoinParams {
        function_name: "join_custom".into(),
        not_found: "-".into(),
    };
    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let entry = engine.compile(&build_join_ir(&params).unwrap()).unwrap();
    let left = StringColumn::from_values(["a"]).unwrap();
    let right = StringColumn::from_values(["b"]).unwrap();
    let out = run_join(&entry, &left, &right).unwrap();
    assert_eq!(out.slot(1), Some("-"));
}

#[test]
fn test_tables_feed_the_join() {
    let left = Table::parse("id,name,dept,key\n1,ann,ops,k2\n2,bob,dev,k9\n");
    let right = Table::parse("id,key\n1,k1\n2,k2\n");
    let left = StringColumn::from_table(&left, 3).unwrap();
    let right = StringColumn::from_table(&right, 1).unwrap();
    assert_eq!(left.get(1), Some("k2"));
    assert_eq!(right.get(2), Some("k2"));

    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let entry = engine
        .compile(&build_join_ir(&JoinParams::default()).unwrap())
        .unwrap();
    let out = run_join(&entry, &left, &right).unwrap();
    assert_eq!(out.matches, 1);
    assert_eq!(out.slot(1), Some("k2"));
    assert_eq!(out.slot(2), Some(NOT_FOUND));
}

#[test]
fn test_shape_mismatch_is_rejected() {
    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let entry = engine
        .compile(&build_join_ir(&JoinParams::default()).unwrap())
        .unwrap();
    let left = StringColumn::from_values(["a", "b"]).unwrap();
    let right = StringColumn::from_values(["a"]).unwrap();
    let err = run_join(&entry, &left, &right).unwrap_err();
    assert!(matches!(err, JitError::ShapeMismatch { left: 3, right: 2 }));
    assert_eq!(err.exit_code(), -3);
}

#[test]
fn test_call_after_shutdown_is_rejected() {
    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let entry = engine
        .compile(&build_join_ir(&JoinParams::default()).unwrap())
        .unwrap();
    engine.shutdown();
    assert_eq!(engine.state(), BackendState::Shutdown);

    let col = StringColumn::from_values(["a"]).unwrap();
    let err = run_join(&entry, &col, &col).unwrap_err();
    assert!(matches!(err, JitError::State { .. }));
    assert_eq!(err.exit_code(), -4);
}

#[test]
fn test_compile_latency() {
    let mut engine = JitEngine::default();
    engine.initialize().unwrap();
    let func = build_join_ir(&JoinParams::default()).unwrap();

    let start = Instant::now();
    engine.compile(&func).unwrap();
    let elapsed = start.elapsed();

    println!("JIT compile time: {:?}", elapsed);
    // Generous bound for debug builds on shared CI machines.
    assert!(elapsed.as_millis() < 2000, "compile took {elapsed:?}");
}
