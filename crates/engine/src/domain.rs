//! Domain: shards, one coordinator and a shared notifier
//!
//! The entry point used by clients and tests. Shards run on their own
//! threads; the coordinator delivers plans to their mailboxes and the
//! results come back through the shared notifier.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use stepshard_concurrency::{ResultKey, ResultNotifier};
use stepshard_core::{
    CoordinatorId, Error, Propose, Result, ShardId, Step, TxId, WriteRequest, WriteResult,
};
use stepshard_storage::{MemTableStore, StorageEngine, TableSchema};

use crate::clock::StepClock;
use crate::config::{ConfigError, ShardConfig, TxExecutionMode};
use crate::coordinator::Coordinator;
use crate::mailbox::ShardHandle;
use crate::metrics::ShardMetrics;
use crate::shard::DataShard;

/// Id of the domain's coordinator
pub const DOMAIN_COORDINATOR: CoordinatorId = CoordinatorId(72_057_594_046_316_545);

/// A set of shards ordered by one coordinator
pub struct Domain {
    config: ShardConfig,
    clock: StepClock,
    coordinator: Coordinator,
    notifier: Arc<ResultNotifier>,
    shards: RwLock<BTreeMap<ShardId, Arc<ShardHandle>>>,
}

impl Domain {
    /// Empty domain; every shard added later uses `config`
    ///
    /// Volatile transactions are refused: they cannot take part in the
    /// prepare/plan protocol the domain runs.
    pub fn new(config: ShardConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        if config.execution_mode() == TxExecutionMode::Volatile {
            return Err(ConfigError::Invalid {
                key: "enable_volatile_transactions",
                reason: "volatile transactions are not supported by the prepared write path"
                    .to_string(),
            });
        }
        let clock = StepClock::default();
        let notifier = Arc::new(ResultNotifier::with_retention(config.result_retention()));
        Ok(Domain {
            coordinator: Coordinator::new(DOMAIN_COORDINATOR, clock.clone()),
            clock,
            config,
            notifier,
            shards: RwLock::new(BTreeMap::new()),
        })
    }

    /// Start a shard backed by a fresh in-memory store
    pub fn add_shard(&self, shard_id: ShardId) -> Result<()> {
        self.add_shard_with_storage(shard_id, Arc::new(MemTableStore::new()))
    }

    /// Start a shard over the given storage
    pub fn add_shard_with_storage(
        &self,
        shard_id: ShardId,
        storage: Arc<dyn StorageEngine>,
    ) -> Result<()> {
        let mut shards = self.shards.write();
        if shards.contains_key(&shard_id) {
            return Err(Error::InvalidOperation(format!(
                "Shard {} already exists",
                shard_id
            )));
        }
        let shard = DataShard::new(
            shard_id,
            self.config.clone(),
            storage,
            vec![self.coordinator.id()],
            self.clock.clone(),
        )?
        .with_notifier(Arc::clone(&self.notifier));
        let handle = Arc::new(ShardHandle::spawn(Arc::new(shard)));
        self.coordinator.register_shard(shard_id, handle.clone());
        shards.insert(shard_id, handle);
        info!(target: "stepshard::coordinator", shard = %shard_id, "Shard added");
        Ok(())
    }

    fn shard(&self, shard_id: ShardId) -> Result<Arc<ShardHandle>> {
        self.shards
            .read()
            .get(&shard_id)
            .cloned()
            .ok_or_else(|| Error::InvalidOperation(format!("Unknown shard {}", shard_id)))
    }

    /// Create a table on a shard
    pub fn create_table(&self, shard_id: ShardId, schema: TableSchema) -> Result<Arc<TableSchema>> {
        self.shard(shard_id)?.shard().create_table(schema)
    }

    /// Submit a write to a shard and wait for its immediate answer
    pub fn write(&self, shard_id: ShardId, request: WriteRequest) -> Result<WriteResult> {
        Ok(self.shard(shard_id)?.write(request))
    }

    /// Send a proposal to the coordinator; returns the assigned step
    pub fn propose(&self, propose: Propose) -> Result<Step> {
        Ok(self.coordinator.propose(propose)?)
    }

    /// Wait for the asynchronous result of `tx_id` on `shard_id`, using
    /// the configured timeout
    pub fn wait_for_completed(&self, shard_id: ShardId, tx_id: TxId) -> Option<WriteResult> {
        self.wait_for_result(shard_id, tx_id, self.config.plan_wait_timeout())
    }

    /// Wait for the asynchronous result of `tx_id` on `shard_id`
    pub fn wait_for_result(
        &self,
        shard_id: ShardId,
        tx_id: TxId,
        timeout: Duration,
    ) -> Option<WriteResult> {
        self.notifier.wait(ResultKey::new(shard_id, tx_id), timeout)
    }

    /// Render a table of a shard in key order
    pub fn read_table(&self, shard_id: ShardId, path: &str) -> Result<String> {
        self.shard(shard_id)?.shard().read_table(path)
    }

    /// Move time forward and expire what fell out of its window
    ///
    /// Returns the new time and how many pending transactions were dropped.
    pub fn advance_clock(&self, steps: u64) -> (Step, usize) {
        let now = self.clock.advance(steps);
        let handles: Vec<Arc<ShardHandle>> = self.shards.read().values().cloned().collect();
        let expired = handles.iter().map(|h| h.expire_pending(now)).sum();
        (now, expired)
    }

    /// Current time
    pub fn now(&self) -> Step {
        self.clock.now()
    }

    /// Coordinator of the domain
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Counter snapshot of a shard
    pub fn shard_metrics(&self, shard_id: ShardId) -> Result<ShardMetrics> {
        Ok(self.shard(shard_id)?.shard().metrics())
    }

    /// Stop every shard thread
    pub fn shutdown(&self) {
        let handles: Vec<Arc<ShardHandle>> = self.shards.read().values().cloned().collect();
        for handle in handles {
            handle.shutdown();
        }
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        self.shutdown();
    }
}
