//! Shard write path engine
//!
//! This crate wires the lower layers into running shards:
//! - DataShard: immediate writes, prepare, plan resolution, expiry
//! - Request validation (row key limit, columns, payload format)
//! - Write Executor, Transaction Preparer, Distributed Commit Resolver
//! - StepClock and the step window policy
//! - Coordinator and the shard mailbox threads it plans through
//! - Domain: the client-facing facade over shards and coordinator
//! - ShardConfig: `stepshard.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod executor;
pub mod mailbox;
pub mod metrics;
pub mod preparer;
pub mod resolver;
pub mod rows;
pub mod shard;
pub mod validator;

pub use clock::{LeaseWindowPolicy, StepClock, StepWindowPolicy};
pub use config::{ConfigError, ShardConfig, TxExecutionMode, CONFIG_FILE_NAME};
pub use coordinator::{Coordinator, CoordinatorMetrics, PlanSink};
pub use domain::{Domain, DOMAIN_COORDINATOR};
pub use executor::WriteExecutor;
pub use mailbox::ShardHandle;
pub use metrics::ShardMetrics;
pub use preparer::TransactionPreparer;
pub use resolver::{CommitResolver, PlanOutcome};
pub use rows::{generate_rows, upsert_request};
pub use shard::DataShard;
pub use validator::{Rejection, RequestValidator, RowKeyValidator};
