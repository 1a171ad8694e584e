//! Bounded FIFO command queue
//!
//! Submission never blocks: an entry is either appended or rejected with
//! `QueueOverflow`. An entry stays counted as pending until the worker has
//! dispatched it, so draining means "every submitted command has run".

use std::collections::VecDeque;
use std::time::Duration;

use errors::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use super::command::Command;
use super::motion::MotionChange;

/// A queued command, with the move it starts if any
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub command: Command,
    pub motion: MotionChange,
    /// Response wait when dispatched; `None` uses the engine's read timeout
    pub timeout: Option<Duration>,
}

impl QueuedCommand {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            motion: MotionChange::Keep,
            timeout: None,
        }
    }
}

#[derive(Debug)]
pub struct CommandQueue {
    entries: Mutex<VecDeque<QueuedCommand>>,
    max_len: usize,
    added: Notify,
    pending: watch::Sender<usize>,
}

impl CommandQueue {
    pub fn new(max_len: usize) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_len)),
            max_len,
            added: Notify::new(),
            pending,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, entry: QueuedCommand) -> BridgeResult<()> {
        let len = {
            let mut entries = self.entries.lock();
            if entries.len() >= self.max_len {
                return Err(BridgeError::QueueOverflow);
            }
            entries.push_back(entry);
            entries.len()
        };
        self.pending.send_replace(len);
        self.added.notify_one();
        Ok(())
    }

    /// Oldest entry, left in place until [`complete_front`](Self::complete_front)
    pub fn front(&self) -> Option<QueuedCommand> {
        self.entries.lock().front().cloned()
    }

    /// Remove the oldest entry once it has been dispatched
    pub fn complete_front(&self) {
        let len = {
            let mut entries = self.entries.lock();
            entries.pop_front();
            entries.len()
        };
        self.pending.send_replace(len);
    }

    /// Resolves when something was pushed since the last call
    pub async fn added(&self) {
        self.added.notified().await;
    }

    /// Resolves once no entry is pending; immediately if already empty
    pub async fn wait_empty(&self) {
        let mut pending = self.pending.subscribe();
        // The sender lives as long as the queue, so this cannot fail
        let _ = pending.wait_for(|len| *len == 0).await;
    }
}
