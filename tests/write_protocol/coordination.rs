//! Coordination Failure Tests
//!
//! Plans for unknown, expired or out-of-window transactions are answered
//! STALE_COORDINATION, which stays distinct from BAD_REQUEST.

use std::time::Duration;

use stepshard::{Error, ProposeError, StepWindow};

use crate::common::*;

const SHARD: ShardId = ShardId(72_075_186_224_037_888);

#[test]
fn plan_for_unknown_transaction_is_stale() {
    let t = TestShard::new(ShardConfig::default());
    let result = t.shard.plan(Plan {
        tx_id: TxId(555),
        step: Step(1001),
    });

    assert_eq!(result.status, WriteStatus::StaleCoordination);
    assert_ne!(result.status, WriteStatus::BadRequest);
    assert!(!result.issues.is_empty());
    // Nothing is published for a transaction nobody prepared here
    assert!(t
        .shard
        .notifier()
        .try_take(ResultKey::new(t.id(), TxId(555)))
        .is_none());
}

#[test]
fn plan_outside_window_drops_the_transaction() {
    let t = TestShard::new(ShardConfig::default());
    let prepared = t.write_rows(100, WriteMode::Prepare);

    let late = t.shard.plan(Plan {
        tx_id: TxId(100),
        step: prepared.max_step().saturating_add(1),
    });
    assert_eq!(late.status, WriteStatus::StaleCoordination);
    assert_eq!(t.shard.pending_count(), 0);
    assert_eq!(t.shard.prepared_count(), 0);
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), "");

    let published = t
        .shard
        .notifier()
        .try_take(ResultKey::new(t.id(), TxId(100)))
        .unwrap();
    assert_eq!(published.status, WriteStatus::StaleCoordination);

    // A correct plan after the drop no longer finds the transaction
    let retry = t.shard.plan(Plan {
        tx_id: TxId(100),
        step: prepared.min_step(),
    });
    assert_eq!(retry.status, WriteStatus::StaleCoordination);
    assert_eq!(t.store.applied_batches(), 0);
}

#[test]
fn plan_before_window_is_stale() {
    let t = TestShard::new(ShardConfig::default());
    let prepared = t.write_rows(100, WriteMode::Prepare);

    let early = t.shard.plan(Plan {
        tx_id: TxId(100),
        step: Step(prepared.min_step().get() - 1),
    });
    assert_eq!(early.status, WriteStatus::StaleCoordination);
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), "");
}

#[test]
fn concurrent_plans_execute_exactly_once() {
    let t = TestShard::new(ShardConfig::default());
    let prepared = t.write_rows(100, WriteMode::Prepare);
    let plan = Plan {
        tx_id: TxId(100),
        step: prepared.min_step(),
    };

    let statuses: Vec<WriteStatus> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| t.shard.plan(plan).status))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let completed = statuses
        .iter()
        .filter(|s| **s == WriteStatus::Completed)
        .count();
    assert_eq!(completed, 1);
    assert!(statuses
        .iter()
        .all(|s| matches!(s, WriteStatus::Completed | WriteStatus::StaleCoordination)));
    assert_eq!(t.store.applied_batches(), 1);
    assert_eq!(t.shard.read_table("/Root/table-1").unwrap(), EXPECTED_TABLE_STATE);
}

#[test]
fn expired_transaction_reports_stale_and_cannot_be_planned() {
    let config = ShardConfig {
        step_window_width: 10,
        ..ShardConfig::default()
    };
    let (domain, tables) = domain_with_tables(config, &[SHARD.0]);
    let prepared = domain
        .write(SHARD, upsert_pairs(100, WriteMode::Prepare, &tables[0], &[(0, 1)]))
        .unwrap();
    assert_eq!(prepared.status, WriteStatus::Prepared);

    let (now, expired) = domain.advance_clock(prepared.max_step().get() + 1);
    assert!(now > prepared.max_step());
    assert_eq!(expired, 1);

    let stale = domain.wait_for_result(SHARD, TxId(100), WAIT).unwrap();
    assert_eq!(stale.status, WriteStatus::StaleCoordination);
    assert_eq!(domain.shard_metrics(SHARD).unwrap().expired, 1);

    let err = domain
        .propose(Propose::from_prepared(TxId(100), &[prepared]).unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::Coordination(_)), "{err}");
    assert_eq!(domain.read_table(SHARD, "/Root/table-1").unwrap(), "");
}

#[test]
fn later_proposals_expire_an_abandoned_transaction() {
    let config = ShardConfig {
        step_window_width: 5,
        ..ShardConfig::default()
    };
    let (domain, tables) = domain_with_tables(config, &[SHARD.0]);

    // Prepared but never proposed
    let abandoned = domain
        .write(SHARD, upsert_pairs(100, WriteMode::Prepare, &tables[0], &[(0, 1)]))
        .unwrap();
    assert_eq!(abandoned.status, WriteStatus::Prepared);

    for tx in 200..220u64 {
        let key = tx as u32;
        let prepared = domain
            .write(SHARD, upsert_pairs(tx, WriteMode::Prepare, &tables[0], &[(key, key)]))
            .unwrap();
        domain
            .propose(Propose::from_prepared(TxId(tx), &[prepared]).unwrap())
            .unwrap();
        let done = domain.wait_for_completed(SHARD, TxId(tx)).unwrap();
        assert_eq!(done.status, WriteStatus::Completed);
    }
    assert!(domain.now() > abandoned.max_step());

    // No explicit clock advance: the coordinator's steps alone expire it
    let stale = domain.wait_for_result(SHARD, TxId(100), WAIT).unwrap();
    assert_eq!(stale.status, WriteStatus::StaleCoordination);
    let metrics = domain.shard_metrics(SHARD).unwrap();
    assert_eq!(metrics.pending, 0);
    assert_eq!(metrics.expired, 1);
    assert_eq!(metrics.planned, 20);
    assert!(!domain
        .read_table(SHARD, "/Root/table-1")
        .unwrap()
        .contains("key = 0,"));
}

#[test]
fn disjoint_windows_cannot_be_proposed() {
    let a = WriteResult::prepared(
        ShardId(1),
        TxId(7),
        StepWindow::new(Step(10), Step(20)).unwrap(),
        vec![DOMAIN_COORDINATOR],
    );
    let b = WriteResult::prepared(
        ShardId(2),
        TxId(7),
        StepWindow::new(Step(30), Step(40)).unwrap(),
        vec![DOMAIN_COORDINATOR],
    );

    assert!(matches!(
        Propose::from_prepared(TxId(7), &[a.clone(), b]),
        Err(ProposeError::EmptyIntersection { .. })
    ));

    let failed = WriteResult::failure(
        ShardId(2),
        TxId(7),
        WriteStatus::BadRequest,
        vec![stepshard::Issue::error("rejected")],
    );
    assert!(matches!(
        Propose::from_prepared(TxId(7), &[a, failed]),
        Err(ProposeError::NotPrepared { .. })
    ));
}

#[test]
fn proposal_to_unknown_shard_plans_nothing() {
    let (domain, tables) = domain_with_tables(ShardConfig::default(), &[SHARD.0]);
    let prepared = domain
        .write(SHARD, upsert_pairs(100, WriteMode::Prepare, &tables[0], &[(0, 1)]))
        .unwrap();

    let mut propose = Propose::from_prepared(TxId(100), &[prepared]).unwrap();
    propose.shards.push(ShardId(42));
    let err = domain.propose(propose).unwrap_err();
    assert!(matches!(err, Error::Coordination(_)));
    assert_eq!(domain.coordinator().metrics().total_rejected, 1);
    assert_eq!(domain.shard_metrics(SHARD).unwrap().pending, 1);
}

#[test]
fn waiting_for_an_unplanned_result_times_out() {
    let (domain, _tables) = domain_with_tables(ShardConfig::default(), &[SHARD.0]);
    assert!(domain
        .wait_for_result(SHARD, TxId(999), Duration::from_millis(50))
        .is_none());
}
