//! Shard mailbox
//!
//! Each shard runs on its own named thread and is driven by messages
//! delivered over an `mpsc` channel, so writes and plans for one shard are
//! processed in arrival order. Plan delivery is fire-and-forget; the
//! result reaches the client through the notifier. Clock ticks from the
//! coordinator arrive on the same channel, after the plans they follow,
//! and expire pending transactions whose window has passed.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, trace};

use stepshard_core::{
    Issue, Plan, ProposeError, ShardId, Step, TxId, WriteRequest, WriteResult, WriteStatus,
};

use crate::coordinator::PlanSink;
use crate::shard::DataShard;

enum ShardMessage {
    Write {
        request: WriteRequest,
        reply: Sender<WriteResult>,
    },
    Plan(Plan),
    Tick(Step),
    Expire {
        now: Step,
        reply: Sender<usize>,
    },
    Shutdown,
}

/// Handle to a shard running on its own thread
pub struct ShardHandle {
    shard: Arc<DataShard>,
    sender: Mutex<Sender<ShardMessage>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ShardHandle {
    /// Start the shard's thread
    pub fn spawn(shard: Arc<DataShard>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker_shard = Arc::clone(&shard);
        let handle = std::thread::Builder::new()
            .name(format!("stepshard-shard-{}", shard.shard_id()))
            .spawn(move || run(&worker_shard, receiver))
            .expect("failed to spawn shard thread");

        ShardHandle {
            shard,
            sender: Mutex::new(sender),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Shard id
    pub fn shard_id(&self) -> ShardId {
        self.shard.shard_id()
    }

    /// The shard itself, for reads and metrics
    pub fn shard(&self) -> &Arc<DataShard> {
        &self.shard
    }

    /// Submit a write and wait for its result
    pub fn write(&self, request: WriteRequest) -> WriteResult {
        let tx_id = request.tx_id;
        let (reply, answer) = mpsc::channel();
        if self
            .sender
            .lock()
            .send(ShardMessage::Write { request, reply })
            .is_err()
        {
            return self.stopped(tx_id);
        }
        answer.recv().unwrap_or_else(|_| self.stopped(tx_id))
    }

    /// Drop pending transactions whose window ended before `now`
    pub fn expire_pending(&self, now: Step) -> usize {
        let (reply, answer) = mpsc::channel();
        if self
            .sender
            .lock()
            .send(ShardMessage::Expire { now, reply })
            .is_err()
        {
            return 0;
        }
        answer.recv().unwrap_or(0)
    }

    /// Stop the thread after it drains queued messages
    pub fn shutdown(&self) {
        let _ = self.sender.lock().send(ShardMessage::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn stopped(&self, tx_id: TxId) -> WriteResult {
        WriteResult::failure(
            self.shard_id(),
            tx_id,
            WriteStatus::InternalError,
            vec![Issue::error(format!("Shard {} is stopped", self.shard_id()))],
        )
    }
}

impl PlanSink for ShardHandle {
    fn deliver(&self, plan: Plan) -> Result<(), ProposeError> {
        self.sender
            .lock()
            .send(ShardMessage::Plan(plan))
            .map_err(|_| ProposeError::DeliveryFailed {
                shard: self.shard_id(),
                reason: "shard is stopped".to_string(),
            })
    }

    fn clock_advanced(&self, now: Step) {
        // A stopped shard has nothing left to expire.
        let _ = self.sender.lock().send(ShardMessage::Tick(now));
    }
}

impl Drop for ShardHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shard: &DataShard, receiver: Receiver<ShardMessage>) {
    debug!(target: "stepshard::write", shard = %shard.shard_id(), "Shard started");
    while let Ok(message) = receiver.recv() {
        match message {
            ShardMessage::Write { request, reply } => {
                let _ = reply.send(shard.write(request));
            }
            ShardMessage::Plan(plan) => {
                let result = shard.plan(plan);
                trace!(target: "stepshard::plan", shard = %shard.shard_id(), tx_id = %plan.tx_id, status = %result.status, "Plan handled");
            }
            ShardMessage::Tick(now) => {
                shard.expire_pending(now);
            }
            ShardMessage::Expire { now, reply } => {
                let _ = reply.send(shard.expire_pending(now));
            }
            ShardMessage::Shutdown => break,
        }
    }
    debug!(target: "stepshard::write", shard = %shard.shard_id(), "Shard stopped");
}
