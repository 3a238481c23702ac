//! Prepared transactions: persisted form plus a bounded in-memory cache
//!
//! A prepared transaction is the decoded operation set of a PREPARE request,
//! kept until a coordinator plans it or its window expires. It is always
//! stored serialized (MessagePack via `rmp-serde`), which stands in for the
//! shard's local durable copy. A bounded LRU cache keeps the deserialized
//! form so the later plan does not pay for deserialization again.
//!
//! With `capacity == 0` nothing is cached and every access deserializes.
//! Results are identical either way; only the cost differs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stepshard_core::{Error, StepWindow, TxId};
use stepshard_storage::RowWrite;

/// Decoded operation set of a prepared transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTx {
    /// Transaction id
    pub tx_id: TxId,
    /// Window the coordinator must plan within
    pub window: StepWindow,
    /// Row writes in submission order
    pub writes: Vec<RowWrite>,
}

impl PreparedTx {
    /// Serialize to MessagePack bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, PreparedError> {
        rmp_serde::to_vec(self).map_err(|e| PreparedError::SerializeFailed(e.to_string()))
    }

    /// Deserialize from MessagePack bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreparedError> {
        rmp_serde::from_slice(bytes).map_err(|e| PreparedError::DeserializeFailed(e.to_string()))
    }
}

/// Errors from prepared transaction serialization
#[derive(Debug, Clone, Error)]
pub enum PreparedError {
    /// Failed to serialize
    #[error("Failed to serialize prepared transaction: {0}")]
    SerializeFailed(String),

    /// Failed to deserialize
    #[error("Failed to deserialize prepared transaction: {0}")]
    DeserializeFailed(String),
}

impl From<PreparedError> for Error {
    fn from(e: PreparedError) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that had to deserialize
    pub misses: u64,
}

#[derive(Debug, Default)]
struct LruCache {
    entries: HashMap<TxId, (Arc<PreparedTx>, u64)>,
    tick: u64,
}

impl LruCache {
    fn get(&mut self, tx_id: TxId) -> Option<Arc<PreparedTx>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&tx_id).map(|(tx, used)| {
            *used = tick;
            Arc::clone(tx)
        })
    }

    fn insert(&mut self, tx: Arc<PreparedTx>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        self.tick += 1;
        if !self.entries.contains_key(&tx.tx_id) && self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(tx.tx_id, (tx, self.tick));
    }

    fn remove(&mut self, tx_id: TxId) {
        self.entries.remove(&tx_id);
    }
}

/// Persisted prepared transactions keyed by `TxId`, fronted by an LRU cache
#[derive(Debug)]
pub struct PreparedTxStore {
    persisted: DashMap<TxId, Vec<u8>>,
    cache: Mutex<LruCache>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PreparedTxStore {
    /// Store whose cache holds at most `capacity` transactions
    pub fn new(capacity: usize) -> Self {
        PreparedTxStore {
            persisted: DashMap::new(),
            cache: Mutex::new(LruCache::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Persist a prepared transaction and cache it
    pub fn insert(&self, tx: PreparedTx) -> Result<(), PreparedError> {
        let bytes = tx.to_bytes()?;
        self.persisted.insert(tx.tx_id, bytes);
        self.cache.lock().insert(Arc::new(tx), self.capacity);
        Ok(())
    }

    /// Load a prepared transaction, from cache when possible
    pub fn get(&self, tx_id: TxId) -> Result<Option<Arc<PreparedTx>>, PreparedError> {
        if let Some(tx) = self.cache.lock().get(tx_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(tx));
        }

        let Some(bytes) = self.persisted.get(&tx_id).map(|b| b.value().clone()) else {
            return Ok(None);
        };
        self.misses.fetch_add(1, Ordering::Relaxed);
        let tx = Arc::new(PreparedTx::from_bytes(&bytes)?);
        self.cache.lock().insert(Arc::clone(&tx), self.capacity);
        Ok(Some(tx))
    }

    /// Forget a transaction; returns true if it was stored
    pub fn remove(&self, tx_id: TxId) -> bool {
        self.cache.lock().remove(tx_id);
        self.persisted.remove(&tx_id).is_some()
    }

    /// True if the transaction is stored
    pub fn contains(&self, tx_id: TxId) -> bool {
        self.persisted.contains_key(&tx_id)
    }

    /// Number of stored transactions
    pub fn len(&self) -> usize {
        self.persisted.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty()
    }

    /// Number of cached transactions
    pub fn cached_len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    /// Hit/miss counters
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
