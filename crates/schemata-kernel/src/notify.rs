//! Batched change notifications.
//!
//! Mutations push [`FileChange`]s into a [`ChangeQueue`]. The first push
//! into an empty queue arms a [`FlushScheduler`]; when it fires, everything
//! pushed in the meantime is published as one batch on a broadcast channel.
//! A burst of mutations therefore yields one batch per window instead of one
//! event per mutation.
//!
//! The scheduler is a seam: [`TokioScheduler`] sleeps on the runtime,
//! [`ManualScheduler`] flushes only when told to, for deterministic tests.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::broadcast;
use tracing::debug;

use crate::vfs::VfsPath;

/// Capacity of the change broadcast channel, in batches.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// One change to one virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: VfsPath,
}

impl FileChange {
    pub fn created(path: VfsPath) -> Self {
        Self { kind: ChangeKind::Created, path }
    }

    pub fn changed(path: VfsPath) -> Self {
        Self { kind: ChangeKind::Changed, path }
    }
}

/// Decides when an armed queue flushes.
pub trait FlushScheduler: Send + Sync {
    /// Arrange for `queue.flush()` to run after `delay`.
    fn schedule(&self, delay: Duration, queue: Weak<ChangeQueue>);
}

/// Flushes after a real timer on the current tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl FlushScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, queue: Weak<ChangeQueue>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = queue.upgrade() {
                queue.flush();
            }
        });
    }
}

/// Records armed queues and flushes them on [`fire`](Self::fire).
#[derive(Default)]
pub struct ManualScheduler {
    armed: Mutex<Vec<Weak<ChangeQueue>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flushes waiting to fire.
    pub fn pending(&self) -> usize {
        self.armed.lock().len()
    }

    /// Flush every armed queue. Returns the number of batches published.
    pub fn fire(&self) -> usize {
        let armed = std::mem::take(&mut *self.armed.lock());
        armed
            .into_iter()
            .filter_map(|q| q.upgrade())
            .map(|q| q.flush())
            .filter(|&flushed| flushed > 0)
            .count()
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule(&self, _delay: Duration, queue: Weak<ChangeQueue>) {
        self.armed.lock().push(queue);
    }
}

#[derive(Default)]
struct QueueState {
    pending: Vec<FileChange>,
    armed: bool,
}

/// Coalescing buffer in front of the change channel.
pub struct ChangeQueue {
    state: Mutex<QueueState>,
    tx: broadcast::Sender<Vec<FileChange>>,
    delay: Duration,
    scheduler: Arc<dyn FlushScheduler>,
    this: Weak<ChangeQueue>,
}

impl ChangeQueue {
    pub fn new(delay: Duration, scheduler: Arc<dyn FlushScheduler>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(QueueState::default()),
            tx,
            delay,
            scheduler,
            this: this.clone(),
        })
    }

    pub fn push(&self, change: FileChange) {
        self.push_all(std::iter::once(change));
    }

    pub fn push_all(&self, changes: impl IntoIterator<Item = FileChange>) {
        let arm = {
            let mut state = self.state.lock();
            let before = state.pending.len();
            state.pending.extend(changes);
            if state.pending.len() > before && !state.armed {
                state.armed = true;
                true
            } else {
                false
            }
        };
        if arm {
            self.scheduler.schedule(self.delay, self.this.clone());
        }
    }

    /// Publish pending changes as one batch. Returns the batch size.
    pub fn flush(&self) -> usize {
        let batch = {
            let mut state = self.state.lock();
            state.armed = false;
            std::mem::take(&mut state.pending)
        };
        if batch.is_empty() {
            return 0;
        }
        let len = batch.len();
        let receivers = self.tx.send(batch).unwrap_or(0);
        debug!(changes = len, receivers, "flushed change batch");
        len
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<FileChange>> {
        self.tx.subscribe()
    }
}
