//! Update Scheduler
//!
//! The scheduler determines the order in which dirty subscribers re-run.
//!
//! # Algorithm
//!
//! Every subscriber carries a creation order. Pending subscribers are kept
//! sorted by that order, so one created earlier (typically the computation
//! that created the later ones) re-runs first. This approximates a
//! topological order without sorting the graph:
//!
//! 1. A trigger marks subscribers dirty and enqueues each one at most once.
//! 2. A flush walks the queue front to back with a cursor.
//! 3. Subscribers enqueued while flushing are inserted after the cursor in
//!    order position, so a lower order runs next instead of waiting for the
//!    following pass.
//! 4. Every run within one flush is counted per subscriber; exceeding the
//!    configured limit aborts the flush.

use std::collections::HashMap;

use crate::reactive::SubscriberId;

/// Pending work, ordered by subscriber creation order.
#[derive(Debug, Default)]
pub(crate) struct UpdateScheduler {
    queue: Vec<(u64, SubscriberId)>,
    cursor: usize,
    flushing: bool,
    requested: bool,
    runs: HashMap<SubscriberId, u32>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscriber keeping ascending order.
    ///
    /// Callers dedupe through the node's `queued` flag.
    pub fn enqueue(&mut self, id: SubscriberId, order: u64) {
        let start = if self.flushing { self.cursor } else { 0 };
        let offset = self.queue[start..].partition_point(|(pending, _)| *pending <= order);
        self.queue.insert(start + offset, (order, id));
    }

    /// Mark that an out-of-band flush has been requested.
    ///
    /// Returns `true` only for the first request after an idle period.
    pub fn request(&mut self) -> bool {
        if self.flushing || self.requested {
            return false;
        }
        self.requested = true;
        true
    }

    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.cursor = 0;
        true
    }

    /// Next subscriber to process, advancing the cursor.
    pub fn next(&mut self) -> Option<SubscriberId> {
        let (_, id) = *self.queue.get(self.cursor)?;
        self.cursor += 1;
        Some(id)
    }

    /// Count one more run of `id`; returns the count within this flush.
    pub fn record_run(&mut self, id: SubscriberId) -> u32 {
        let count = self.runs.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop everything that has not been processed yet.
    pub fn abort(&mut self) -> Vec<SubscriberId> {
        let dropped = self.queue.drain(self.cursor..).map(|(_, id)| id).collect();
        self.end_flush();
        dropped
    }

    pub fn end_flush(&mut self) {
        self.queue.clear();
        self.cursor = 0;
        self.flushing = false;
        self.requested = false;
        self.runs.clear();
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Number of subscribers waiting to be processed.
    pub fn pending(&self) -> usize {
        self.queue.len() - self.cursor.min(self.queue.len())
    }
}
