//! Write Protocol Integration Tests
//!
//! End-to-end behaviour of the shard write path: immediate writes, the
//! prepare / propose / plan cycle across shards, request validation,
//! coordination failures and result delivery.
//!
//! ```bash
//! cargo test --test write_protocol
//! cargo test --test write_protocol distributed::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod coordination;
mod distributed;
mod immediate;
mod prepared;
mod validation;
