//! Distributed Transaction Tests
//!
//! Prepare on several shards, propose the intersected window, and observe
//! every participant commit at the same step.

use std::sync::Arc;

use crate::common::*;

const SHARD_1: ShardId = ShardId(72_075_186_224_037_888);
const SHARD_2: ShardId = ShardId(72_075_186_224_037_889);

#[test]
fn two_shards_commit_at_the_same_step() {
    let (domain, tables) = domain_with_tables(ShardConfig::default(), &[SHARD_1.0, SHARD_2.0]);

    let first = domain
        .write(
            SHARD_1,
            upsert_pairs(100, WriteMode::Prepare, &tables[0], &[(0, 1)]),
        )
        .unwrap();
    let second = domain
        .write(
            SHARD_2,
            upsert_pairs(100, WriteMode::Prepare, &tables[1], &[(2, 3)]),
        )
        .unwrap();
    assert_eq!(first.status, WriteStatus::Prepared);
    assert_eq!(second.status, WriteStatus::Prepared);
    assert_eq!(first.domain_coordinators, vec![DOMAIN_COORDINATOR]);

    let propose = Propose::from_prepared(TxId(100), &[first.clone(), second.clone()]).unwrap();
    assert_eq!(propose.shards, vec![SHARD_1, SHARD_2]);
    assert!(propose.window.min_step() >= first.min_step());
    assert!(propose.window.max_step() <= second.max_step());

    let step = domain.propose(propose).unwrap();

    let done_1 = domain.wait_for_completed(SHARD_1, TxId(100)).unwrap();
    let done_2 = domain.wait_for_completed(SHARD_2, TxId(100)).unwrap();
    assert_eq!(done_1.status, WriteStatus::Completed, "{}", done_1.issues_text());
    assert_eq!(done_2.status, WriteStatus::Completed, "{}", done_2.issues_text());
    assert_eq!(done_1.step, step);
    assert_eq!(done_1.step, done_2.step);
    assert!(done_1.step > Step::ZERO);
    assert_eq!(done_1.origin, SHARD_1);
    assert_eq!(done_2.origin, SHARD_2);

    assert_eq!(
        domain.read_table(SHARD_1, "/Root/table-1").unwrap(),
        "key = 0, value = 1\n"
    );
    assert_eq!(
        domain.read_table(SHARD_2, "/Root/table-2").unwrap(),
        "key = 2, value = 3\n"
    );
}

#[test]
fn steps_increase_across_transactions() {
    let (domain, tables) = domain_with_tables(ShardConfig::default(), &[SHARD_1.0, SHARD_2.0]);

    let mut steps = Vec::new();
    for tx in 100..103u64 {
        let key = tx as u32;
        let results: Vec<WriteResult> = [SHARD_1, SHARD_2]
            .iter()
            .zip(&tables)
            .map(|(shard, table)| {
                domain
                    .write(*shard, upsert_pairs(tx, WriteMode::Prepare, table, &[(key, key)]))
                    .unwrap()
            })
            .collect();
        let step = domain
            .propose(Propose::from_prepared(TxId(tx), &results).unwrap())
            .unwrap();
        for shard in [SHARD_1, SHARD_2] {
            let done = domain.wait_for_completed(shard, TxId(tx)).unwrap();
            assert_eq!(done.step, step);
        }
        steps.push(step);
    }

    assert!(steps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(domain.coordinator().metrics().total_planned, 3);
    assert_eq!(domain.shard_metrics(SHARD_1).unwrap().planned, 3);
}

#[test]
fn single_shard_prepare_through_domain() {
    let (domain, tables) = domain_with_tables(ShardConfig::default(), &[SHARD_1.0]);
    let request = upsert_request(TxId(100), WriteMode::Prepare, &tables[0], 3).unwrap();
    let prepared = domain.write(SHARD_1, request).unwrap();

    let step = domain
        .propose(Propose::from_prepared(TxId(100), &[prepared]).unwrap())
        .unwrap();
    let done = domain.wait_for_completed(SHARD_1, TxId(100)).unwrap();

    assert_eq!(done.step, step);
    assert_eq!(
        domain.read_table(SHARD_1, "/Root/table-1").unwrap(),
        EXPECTED_TABLE_STATE
    );
}

#[test]
fn immediate_writes_through_domain_skip_coordination() {
    let (domain, tables) = domain_with_tables(ShardConfig::default(), &[SHARD_1.0]);
    let result = domain
        .write(
            SHARD_1,
            upsert_pairs(100, WriteMode::Immediate, &tables[0], &[(4, 5), (0, 1), (2, 3)]),
        )
        .unwrap();

    assert_eq!(result.status, WriteStatus::Completed);
    assert_eq!(result.step, Step::ZERO);
    assert_eq!(domain.coordinator().metrics().total_proposed, 0);
    assert_eq!(
        domain.read_table(SHARD_1, "/Root/table-1").unwrap(),
        EXPECTED_TABLE_STATE
    );
}

#[test]
fn storage_failure_during_plan_is_reported() {
    init_tracing();
    let domain = Domain::new(ShardConfig::default()).unwrap();
    let store = Arc::new(MemTableStore::new());
    domain
        .add_shard_with_storage(SHARD_1, store.clone())
        .unwrap();
    let table = domain
        .create_table(SHARD_1, key_value_schema(1, "/Root/table-1"))
        .unwrap();

    let prepared = domain
        .write(SHARD_1, upsert_pairs(100, WriteMode::Prepare, &table, &[(0, 1)]))
        .unwrap();
    assert_eq!(prepared.status, WriteStatus::Prepared);

    store.inject_apply_failure("disk full");
    domain
        .propose(Propose::from_prepared(TxId(100), &[prepared]).unwrap())
        .unwrap();

    let done = domain.wait_for_completed(SHARD_1, TxId(100)).unwrap();
    assert_eq!(done.status, WriteStatus::InternalError);
    assert!(done.issues_text().contains("disk full"));
    assert_eq!(domain.read_table(SHARD_1, "/Root/table-1").unwrap(), "");
    assert_eq!(domain.shard_metrics(SHARD_1).unwrap().pending, 0);
}
