//! Transaction protocol properties, exercised through the public API.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use txgraph_core::{
    AtomicOracle, CoreConfig, CoreError, Database, ErrorKind, Timestamp, TimestampOracle,
    TxnState, Uid,
};
use txgraph_testkit::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn name_of(db: &Database, ts: Timestamp, uid: Uid) -> Vec<String> {
    text_at(db, ts, uid, "name")
}

// P1: ordering

#[test]
fn timestamps_are_unique_and_increasing_under_concurrency() {
    let oracle = AtomicOracle::new();
    let per_thread = allocate_concurrently(&oracle, 8, 500);

    for seen in &per_thread {
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
    let all: BTreeSet<Timestamp> = per_thread.iter().flatten().copied().collect();
    assert_eq!(all.len(), 8 * 500);
    assert_eq!(all.last().copied(), Some(oracle.current()));
}

#[test]
fn commit_timestamps_never_repeat() {
    init_tracing();
    let db = Database::open_in_memory().unwrap();
    let report = contended_writes(&db, &StressConfig::default());

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.total(), 4 * 50);
    let commits: BTreeSet<Timestamp> = report.commits.iter().map(|c| c.commit_ts).collect();
    assert_eq!(commits.len(), report.commits.len());
}

// P2: snapshot isolation

#[test]
fn staged_writes_are_invisible_until_commit() {
    with_temp_db(|db| {
        let staged = stage_rdf(db, r#"_:a <name> "Alice" ."#);
        let alice = staged.uids["a"];

        let outsider = db.read(Timestamp::ZERO, |_| ()).unwrap().0;
        assert!(name_of(db, outsider, alice).is_empty());
        assert_eq!(name_of(db, staged.start_ts, alice), vec!["Alice"]);

        let commit_ts = db.commit(staged.start_ts, &staged.keys).unwrap().commit_ts;
        let after = Timestamp::new(commit_ts.as_u64() - 1);
        assert!(name_of(db, after, alice).is_empty());
        assert!(name_of(db, outsider, alice).is_empty());
        assert_eq!(name_of(db, commit_ts, alice), vec!["Alice"]);
        assert_eq!(name_of(db, Timestamp::ZERO, alice), vec!["Alice"]);
    });
}

#[test]
fn other_transactions_do_not_see_each_others_writes() {
    with_temp_db(|db| {
        let a = stage_rdf(db, r#"<0x1> <name> "from a" ."#);
        let b = stage_rdf(db, r#"<0x2> <name> "from b" ."#);

        assert!(name_of(db, b.start_ts, Uid::new(1)).is_empty());
        assert!(name_of(db, a.start_ts, Uid::new(2)).is_empty());
        assert_eq!(name_of(db, b.start_ts, Uid::new(2)), vec!["from b"]);
    });
}

// P3: conflict detection

#[test]
fn earlier_start_loses_when_later_commits_first() {
    with_temp_db(|db| {
        let ta = stage_rdf(db, r#"<0x1> <balance> "10" ."#);
        let tb = stage_rdf(db, r#"<0x1> <balance> "20" ."#);
        assert!(ta.start_ts < tb.start_ts);

        db.commit(tb.start_ts, &tb.keys).unwrap();
        let err = db.commit(ta.start_ts, &ta.keys).unwrap_err();
        assert!(matches!(err, CoreError::TxnConflict { .. }), "{err}");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(db.txn_state(ta.start_ts), Some(TxnState::Aborted));

        assert_eq!(text_at(db, Timestamp::ZERO, Uid::new(1), "balance"), vec!["20"]);
    });
}

#[test]
fn disjoint_transactions_both_commit() {
    with_temp_db(|db| {
        let ta = stage_rdf(db, r#"<0x1> <balance> "10" ."#);
        let tb = stage_rdf(db, r#"<0x2> <balance> "20" ."#);
        let cb = db.commit(tb.start_ts, &tb.keys).unwrap().commit_ts;
        let ca = db.commit(ta.start_ts, &ta.keys).unwrap().commit_ts;
        assert!(ca > cb);
    });
}

#[test]
fn conflict_is_not_retried_automatically() {
    with_temp_db(|db| {
        let ta = stage_rdf(db, r#"<0x1> <name> "a" ."#);
        commit_rdf(db, r#"<0x1> <name> "b" ."#);
        assert!(db.commit(ta.start_ts, &ta.keys).is_err());
        assert!(matches!(
            db.commit(ta.start_ts, &ta.keys),
            Err(CoreError::TxnAborted { .. })
        ));
    });
}

#[test]
fn contended_writes_leave_the_latest_commit_visible() {
    init_tracing();
    let db = Database::open_in_memory().unwrap();
    let config = StressConfig {
        threads: 6,
        txns_per_thread: 40,
        nodes: 3,
    };
    let report = contended_writes(&db, &config);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.total(), 6 * 40);

    for (node, value) in report.expected_final() {
        assert_eq!(text_at(&db, Timestamp::ZERO, node, "counter"), vec![value]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn schedules_match_the_model(schedule in schedule_strategy(6, 4)) {
        let db = Database::open_in_memory().unwrap();
        let staged: Vec<_> = schedule
            .txns
            .iter()
            .enumerate()
            .map(|(i, cells)| stage_rdf(&db, &cells_to_rdf(cells, &format!("t{i}"))))
            .collect();

        for (i, cells) in schedule.txns.iter().enumerate() {
            let expected: BTreeSet<String> =
                cells.iter().map(|c| c.key().as_str().to_string()).collect();
            let got: BTreeSet<String> =
                staged[i].keys.iter().map(|k| k.as_str().to_string()).collect();
            prop_assert_eq!(got, expected);
        }

        let expected = schedule.expected_outcomes();
        let mut last_commit = Timestamp::ZERO;
        for &i in &schedule.commit_order {
            let result = db.commit(staged[i].start_ts, &staged[i].keys);
            prop_assert_eq!(result.is_ok(), expected[i], "txn {}: {:?}", i, result);
            if let Ok(outcome) = result {
                prop_assert!(outcome.commit_ts > last_commit);
                prop_assert!(outcome.commit_ts > staged[i].start_ts);
                last_commit = outcome.commit_ts;
            }
        }
    }

    // P4: idempotent commit

    #[test]
    fn recommit_returns_the_recorded_outcome(repeats in 1usize..5) {
        let db = Database::open_in_memory().unwrap();
        let (staged, first) = commit_rdf(&db, r#"_:a <name> "Alice" ."#);
        let log_size = db.log_size().unwrap();
        for _ in 0..repeats {
            let again = db.commit(staged.start_ts, &staged.keys).unwrap();
            prop_assert_eq!(again.commit_ts, first.commit_ts);
            prop_assert!(again.replayed);
        }
        prop_assert_eq!(db.log_size().unwrap(), log_size);
    }

    #[test]
    fn blank_nodes_resolve_once_per_call((text, blanks) in blank_mutation_strategy()) {
        let db = Database::open_in_memory().unwrap();
        let staged = stage_rdf(&db, &text);
        let names: BTreeSet<String> = staged.uids.keys().cloned().collect();
        prop_assert_eq!(&names, &blanks);
        let distinct: BTreeSet<Uid> = staged.uids.values().copied().collect();
        prop_assert_eq!(distinct.len(), blanks.len());
    }
}

// Storage failures

#[test]
fn failed_append_leaves_the_transaction_open() {
    init_tracing();
    let (db, switch, storage) = faulty_db(CoreConfig::default());
    let staged = stage_rdf(&db, r#"_:a <name> "Alice" ."#);
    let alice = staged.uids["a"];

    switch.fail_next_appends(1);
    let err = db.commit(staged.start_ts, &staged.keys).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(err.is_retryable());
    assert_eq!(switch.rejected(), 1);
    assert_eq!(db.txn_state(staged.start_ts), Some(TxnState::Open));
    assert!(name_of(&db, Timestamp::ZERO, alice).is_empty());

    let outcome = db.commit(staged.start_ts, &staged.keys).unwrap();
    assert!(!outcome.replayed);
    assert_eq!(name_of(&db, Timestamp::ZERO, alice), vec!["Alice"]);

    let reopened = Database::open(Box::new(storage), CoreConfig::default()).unwrap();
    assert_eq!(name_of(&reopened, Timestamp::ZERO, alice), vec!["Alice"]);
}

#[test]
fn failed_append_does_not_hide_later_conflicts() {
    let (db, switch, _) = faulty_db(CoreConfig::default());
    let ta = stage_rdf(&db, r#"<0x1> <name> "a" ."#);
    let tb = stage_rdf(&db, r#"<0x1> <name> "b" ."#);

    switch.fail_next_appends(1);
    assert!(db.commit(tb.start_ts, &tb.keys).is_err());
    db.commit(ta.start_ts, &ta.keys).unwrap();
    assert!(matches!(
        db.commit(tb.start_ts, &tb.keys),
        Err(CoreError::TxnConflict { .. })
    ));
}

#[test]
fn failed_alter_changes_nothing() {
    let (db, switch, _) = faulty_db(CoreConfig::default());
    switch.fail_all_appends();
    let err = db
        .alter(txgraph_core::Alteration::Schema("name: string @index(term) .".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(!db.schema().has_term_index("name"));
    switch.heal();
}

// Protocol front end over a shared database

#[test]
fn server_and_direct_calls_share_state() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let server = server_for(Arc::clone(&db));
    let (staged, _) = commit_rdf(&db, r#"_:a <name> "Alice" ."#);

    let request = txgraph_server::Request::post(
        "/query",
        format!("{{ q(func: uid({})) {{ name }} }}", staged.uids["a"]),
    );
    let response = server.handle(&request);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["data"], serde_json::json!({"q": [{"name": "Alice"}]}));
    assert!(test_server().database().schema().is_empty());
}
