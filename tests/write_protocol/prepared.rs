//! Prepared Write Tests
//!
//! PREPARE answers carry a usable window and the domain coordinators;
//! the prepared operations run only once a plan arrives.

use proptest::prelude::*;

use crate::common::*;

#[test]
fn prepare_reports_window_and_coordinators() {
    let t = TestShard::new(ShardConfig::default());
    let result = t.write_rows(100, WriteMode::Prepare);

    assert_eq!(result.status, WriteStatus::Prepared, "{}", result.issues_text());
    assert_eq!(result.origin, t.id());
    assert_eq!(result.tx_id, TxId(100));
    assert!(result.min_step() > Step::ZERO);
    assert!(result.max_step() > result.min_step());
    assert_eq!(result.domain_coordinators, vec![DOMAIN_COORDINATOR]);
    assert_eq!(result.tablet_info.unwrap().tablet_id, t.id());

    // Not applied until planned
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), "");
    assert_eq!(t.shard.pending_count(), 1);
}

#[test]
fn window_follows_the_clock_and_configured_width() {
    let config = ShardConfig {
        step_window_width: 50,
        ..ShardConfig::default()
    };
    let t = TestShard::with_clock(config, StepClock::new(Step(200)));
    let result = t.write_rows(100, WriteMode::Prepare);

    assert_eq!(result.min_step(), Step(201));
    assert_eq!(result.max_step(), Step(251));
}

#[test]
fn plan_inside_window_completes_at_planned_step() {
    let t = TestShard::new(ShardConfig::default());
    let prepared = t.write_rows(100, WriteMode::Prepare);
    let step = prepared.min_step().saturating_add(3);

    let result = t.shard.plan(Plan {
        tx_id: TxId(100),
        step,
    });

    assert_eq!(result.status, WriteStatus::Completed, "{}", result.issues_text());
    assert_eq!(result.step, step);
    assert_eq!(result.origin, t.id());
    assert_eq!(result.tx_stats.table_access_stats[0].update_row_count, 3);
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), EXPECTED_TABLE_STATE);
    assert_eq!(t.shard.pending_count(), 0);
    assert_eq!(t.shard.prepared_count(), 0);

    // The completed result was also published for waiting clients
    let published = t
        .shard
        .notifier()
        .wait(ResultKey::new(t.id(), TxId(100)), WAIT)
        .unwrap();
    assert_eq!(published, result);
}

#[test]
fn duplicate_plan_executes_once() {
    let t = TestShard::new(ShardConfig::default());
    let prepared = t.write_rows(100, WriteMode::Prepare);
    let plan = Plan {
        tx_id: TxId(100),
        step: prepared.min_step(),
    };

    assert_eq!(t.shard.plan(plan).status, WriteStatus::Completed);
    let batches = t.store.applied_batches();

    let again = t.shard.plan(plan);
    assert_eq!(again.status, WriteStatus::StaleCoordination);
    assert_eq!(t.store.applied_batches(), batches);
}

#[test]
fn duplicate_prepare_is_rejected() {
    let t = TestShard::new(ShardConfig::default());
    assert_eq!(t.write_rows(100, WriteMode::Prepare).status, WriteStatus::Prepared);

    let again = t.write_rows(100, WriteMode::Prepare);
    assert_eq!(again.status, WriteStatus::BadRequest);
    assert!(again.issues_text().contains("transaction 100 is already prepared"));
    assert_eq!(t.shard.pending_count(), 1);
}

#[test]
fn volatile_mode_refuses_prepare() {
    let config = ShardConfig {
        enable_volatile_transactions: true,
        ..ShardConfig::default()
    };
    let t = TestShard::new(config);

    let result = t.write_rows(100, WriteMode::Prepare);
    assert_eq!(result.status, WriteStatus::BadRequest);
    assert_eq!(t.shard.pending_count(), 0);

    // Immediate writes do not depend on the mode
    assert_eq!(t.write_rows(101, WriteMode::Immediate).status, WriteStatus::Completed);
}

#[test]
fn volatile_domain_is_refused() {
    let config = ShardConfig {
        enable_volatile_transactions: true,
        ..ShardConfig::default()
    };
    assert!(Domain::new(config).is_err());
}

/// Prepare then plan at the window's lower bound, returning the completed
/// result and the table contents
fn prepare_and_plan(cache_size: usize, rows: &[(u32, u32)]) -> (WriteResult, String) {
    let config = ShardConfig {
        data_tx_cache_size: cache_size,
        ..ShardConfig::default()
    };
    let t = TestShard::new(config);
    let prepared = t
        .shard
        .write(upsert_pairs(100, WriteMode::Prepare, &t.table, rows));
    assert_eq!(prepared.status, WriteStatus::Prepared);
    let result = t.shard.plan(Plan {
        tx_id: TxId(100),
        step: prepared.min_step(),
    });
    (result, t.shard.read_table("/Root/table-1").unwrap())
}

#[test]
fn cache_size_does_not_change_outcomes() {
    let rows = [(0, 1), (2, 3), (4, 5)];
    let (uncached, uncached_state) = prepare_and_plan(0, &rows);
    let (cached, cached_state) = prepare_and_plan(64, &rows);

    assert_eq!(uncached.status, WriteStatus::Completed);
    assert_eq!(uncached, cached);
    assert_eq!(uncached_state, EXPECTED_TABLE_STATE);
    assert_eq!(uncached_state, cached_state);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_prepared_window_is_well_formed(
        start in 0u64..1_000_000,
        width in 1u64..100_000,
        tx in 1u64..1_000,
    ) {
        let config = ShardConfig {
            step_window_width: width,
            ..ShardConfig::default()
        };
        let t = TestShard::with_clock(config, StepClock::new(Step(start)));
        let result = t.write_rows(tx, WriteMode::Prepare);

        prop_assert_eq!(result.status, WriteStatus::Prepared);
        prop_assert!(result.min_step() > Step::ZERO);
        prop_assert!(result.max_step() > result.min_step());
        prop_assert!(result.min_step() > Step(start));
    }

    #[test]
    fn prop_cache_size_is_invisible(
        keys in proptest::collection::btree_set(0u32..1000, 1..20),
        cache in 0usize..4,
    ) {
        let rows: Vec<(u32, u32)> = keys.iter().map(|k| (*k, k * 2)).collect();
        let (a, state_a) = prepare_and_plan(0, &rows);
        let (b, state_b) = prepare_and_plan(cache, &rows);
        prop_assert_eq!(a, b);
        prop_assert_eq!(state_a, state_b);
    }
}
