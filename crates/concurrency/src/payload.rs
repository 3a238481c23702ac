//! Payload Store: request blobs registered for the lifetime of a request
//!
//! A write request carries its row data as a list of opaque blobs that its
//! operations reference by index. When a request reaches the shard its blobs
//! are registered here and a `PayloadLease` is handed back. Dropping the
//! lease releases the blobs, so they can never outlive the request, whether
//! it completes, is prepared, or is rejected.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::trace;

use stepshard_core::{Error, TxId};

/// Errors resolving a payload reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Operation references a payload the request does not carry
    #[error("Payload index {index} is out of range, request carries {count} payloads")]
    IndexOutOfRange {
        /// Referenced index
        index: usize,
        /// Payloads in the request
        count: usize,
    },
}

impl From<PayloadError> for Error {
    fn from(e: PayloadError) -> Self {
        Error::InvalidOperation(e.to_string())
    }
}

#[derive(Debug, Default)]
struct Registry {
    live: DashMap<u64, (TxId, usize)>,
    next_id: AtomicU64,
    live_bytes: AtomicUsize,
}

/// Shard-wide registry of in-flight request payloads
#[derive(Debug, Clone, Default)]
pub struct PayloadStore {
    registry: Arc<Registry>,
}

impl PayloadStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a request's blobs until the returned lease drops
    pub fn register(&self, tx_id: TxId, payloads: Vec<Vec<u8>>) -> PayloadLease {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes: usize = payloads.iter().map(Vec::len).sum();
        self.registry.live.insert(id, (tx_id, bytes));
        self.registry.live_bytes.fetch_add(bytes, Ordering::Relaxed);
        trace!(target: "stepshard::payload", tx_id = %tx_id, bytes, count = payloads.len(), "Payload registered");
        PayloadLease {
            id,
            tx_id,
            blobs: payloads,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of requests whose payloads are still held
    pub fn live_count(&self) -> usize {
        self.registry.live.len()
    }

    /// Total bytes currently held
    pub fn live_bytes(&self) -> usize {
        self.registry.live_bytes.load(Ordering::Relaxed)
    }

    /// True if any live lease belongs to `tx_id`
    pub fn holds(&self, tx_id: TxId) -> bool {
        self.registry.live.iter().any(|e| e.value().0 == tx_id)
    }
}

/// Access to one request's blobs; releases them on drop
#[derive(Debug)]
pub struct PayloadLease {
    id: u64,
    tx_id: TxId,
    blobs: Vec<Vec<u8>>,
    registry: Arc<Registry>,
}

impl PayloadLease {
    /// Blob at `index`
    pub fn get(&self, index: usize) -> Result<&[u8], PayloadError> {
        self.blobs
            .get(index)
            .map(Vec::as_slice)
            .ok_or(PayloadError::IndexOutOfRange {
                index,
                count: self.blobs.len(),
            })
    }

    /// Number of blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True if the request carried no blobs
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Owning transaction
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }
}

impl Drop for PayloadLease {
    fn drop(&mut self) {
        if let Some((_, (_, bytes))) = self.registry.live.remove(&self.id) {
            self.registry.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
        }
    }
}
