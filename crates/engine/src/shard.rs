//! DataShard: the shard side of the write protocol
//!
//! A write is validated first, then either executed immediately or
//! prepared. Plans are resolved against the pending table, and results
//! that conclude a prepared transaction are published to the notifier.
//!
//! Every method returns a `WriteResult`; errors never escape as `Err`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use stepshard_concurrency::{
    PayloadLease, PayloadStore, PendingTable, PreparedTxStore, ResultNotifier,
};
use stepshard_core::{
    CoordinatorId, Error, Issue, Plan, Result, ShardId, Step, TableId, WriteMode, WriteRequest,
    WriteResult, WriteStatus,
};
use stepshard_storage::{Row, StorageEngine, TableSchema};

use crate::clock::{LeaseWindowPolicy, StepClock, StepWindowPolicy};
use crate::config::{ConfigError, ShardConfig, TxExecutionMode};
use crate::executor::WriteExecutor;
use crate::metrics::{ShardCounters, ShardMetrics};
use crate::preparer::TransactionPreparer;
use crate::resolver::CommitResolver;
use crate::validator::{Rejection, RequestValidator};

/// One shard of a distributed table
pub struct DataShard {
    shard_id: ShardId,
    config: ShardConfig,
    storage: Arc<dyn StorageEngine>,
    clock: StepClock,
    payloads: PayloadStore,
    pending: Arc<PendingTable>,
    prepared: Arc<PreparedTxStore>,
    notifier: Arc<ResultNotifier>,
    executor: WriteExecutor,
    preparer: TransactionPreparer,
    resolver: CommitResolver,
    counters: ShardCounters,
}

impl DataShard {
    /// Shard `shard_id` over `storage`, reporting `coordinators` with every
    /// PREPARED result and reading time from `clock`
    pub fn new(
        shard_id: ShardId,
        config: ShardConfig,
        storage: Arc<dyn StorageEngine>,
        coordinators: Vec<CoordinatorId>,
        clock: StepClock,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let pending = Arc::new(PendingTable::new());
        let prepared = Arc::new(PreparedTxStore::new(config.data_tx_cache_size));
        let executor = WriteExecutor::new(Arc::clone(&storage));
        let preparer = TransactionPreparer::new(
            shard_id,
            Box::new(LeaseWindowPolicy::new(config.step_window_width)),
            Arc::clone(&pending),
            Arc::clone(&prepared),
            coordinators,
        );
        let resolver = CommitResolver::new(
            shard_id,
            Arc::clone(&pending),
            Arc::clone(&prepared),
            executor.clone(),
        );

        let notifier = Arc::new(ResultNotifier::with_retention(config.result_retention()));
        Ok(DataShard {
            shard_id,
            config,
            storage,
            clock,
            payloads: PayloadStore::new(),
            pending,
            prepared,
            notifier,
            executor,
            preparer,
            resolver,
            counters: ShardCounters::default(),
        })
    }

    /// Publish asynchronous results to a shared notifier
    pub fn with_notifier(mut self, notifier: Arc<ResultNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Derive prepared windows with a custom policy
    pub fn with_window_policy(mut self, policy: Box<dyn StepWindowPolicy>) -> Self {
        self.preparer.set_policy(policy);
        self
    }

    /// Shard id
    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Active configuration
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Notifier receiving this shard's asynchronous results
    pub fn notifier(&self) -> &Arc<ResultNotifier> {
        &self.notifier
    }

    /// Clock this shard reads time from
    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    /// Register a table on this shard
    pub fn create_table(&self, schema: TableSchema) -> Result<Arc<TableSchema>> {
        self.storage.create_table(schema)
    }

    /// Handle a write request
    pub fn write(&self, mut request: WriteRequest) -> WriteResult {
        let tx_id = request.tx_id;
        // Fixed for the lifetime of this transaction.
        let exec_mode = self.config.execution_mode();
        let lease = self
            .payloads
            .register(tx_id, std::mem::take(&mut request.payloads));

        let outcome = self.write_with(&request, &lease, exec_mode);
        drop(lease);

        match outcome {
            Ok(result) => {
                match result.status {
                    WriteStatus::Prepared => self.counters.prepared(),
                    _ => self.counters.immediate_completed(),
                }
                result
            }
            Err(rejection) => {
                self.counters.rejected();
                match rejection.status {
                    WriteStatus::InternalError => {
                        error!(target: "stepshard::write", shard = %self.shard_id, tx_id = %tx_id, issues = ?rejection.issues, "Write failed")
                    }
                    status => {
                        warn!(target: "stepshard::write", shard = %self.shard_id, tx_id = %tx_id, %status, issues = ?rejection.issues, "Write rejected")
                    }
                }
                rejection.into_result(self.shard_id, tx_id)
            }
        }
    }

    fn write_with(
        &self,
        request: &WriteRequest,
        lease: &PayloadLease,
        exec_mode: TxExecutionMode,
    ) -> std::result::Result<WriteResult, Rejection> {
        if request.mode == WriteMode::Prepare && !exec_mode.supports_prepare() {
            return Err(Rejection::bad_request(format!(
                "Volatile transactions are not supported by the prepared write path (transaction {})",
                request.tx_id
            )));
        }

        let writes = RequestValidator::new(self.storage.as_ref(), self.config.limits())
            .validate(request, lease)?;

        match request.mode {
            WriteMode::Immediate => {
                let stats = self.executor.execute(request.tx_id, Step::ZERO, writes)?;
                debug!(target: "stepshard::write", shard = %self.shard_id, tx_id = %request.tx_id, "Immediate write completed");
                Ok(WriteResult::completed(
                    self.shard_id,
                    request.tx_id,
                    Step::ZERO,
                    stats,
                ))
            }
            WriteMode::Prepare => Ok(self
                .preparer
                .prepare(request.tx_id, writes, self.clock.now())?),
        }
    }

    /// Handle a plan from the coordinator
    ///
    /// Results that conclude a prepared transaction are also published to
    /// the notifier.
    pub fn plan(&self, plan: Plan) -> WriteResult {
        let outcome = self.resolver.resolve(plan);
        if outcome.result.status == WriteStatus::Completed {
            self.counters.planned();
        } else {
            self.counters.rejected();
        }
        if outcome.publish {
            self.notifier.publish(outcome.result.clone());
        }
        outcome.result
    }

    /// Drop pending transactions whose window ended before `now`
    ///
    /// A STALE_COORDINATION result is published for each one. Returns how
    /// many were dropped.
    pub fn expire_pending(&self, now: Step) -> usize {
        let expired = self.pending.expire(now);
        if !expired.is_empty() {
            info!(target: "stepshard::plan", shard = %self.shard_id, count = expired.len(), now = %now, "Expiring pending transactions");
            self.counters.expired(expired.len() as u64);
        }
        for reason in &expired {
            let tx_id = reason.tx_id();
            self.prepared.remove(tx_id);
            warn!(target: "stepshard::plan", shard = %self.shard_id, tx_id = %tx_id, now = %now, "Pending transaction expired");
            self.notifier.publish(WriteResult::failure(
                self.shard_id,
                tx_id,
                WriteStatus::StaleCoordination,
                vec![Issue::from(&Error::from(reason.clone()))],
            ));
        }
        expired.len()
    }

    /// Render a table in key order
    pub fn read_table(&self, path: &str) -> Result<String> {
        self.storage.read_table(path)
    }

    /// All rows of a table in key order
    pub fn scan(&self, table_id: TableId) -> Result<Vec<Row>> {
        self.storage.scan(table_id)
    }

    /// Transactions awaiting a plan
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Prepared operation sets still stored
    pub fn prepared_count(&self) -> usize {
        self.prepared.len()
    }

    /// Requests whose payloads are still held
    pub fn live_payloads(&self) -> usize {
        self.payloads.live_count()
    }

    /// Counter snapshot
    pub fn metrics(&self) -> ShardMetrics {
        let cache = self.prepared.cache_stats();
        ShardMetrics {
            pending: self.pending.len() as u64,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            ..self.counters.snapshot()
        }
    }
}
