//! Ordered work queue.
//!
//! Admission enforces non-decreasing checkpoint tags so that everything
//! downstream (handler invocation, emission scheduling, checkpointing)
//! observes feed order. Out-of-order admission exists only for state
//! queries, which carry no tag.

use std::collections::VecDeque;

use crate::error::{ProjectionError, Result};
use crate::tag::CheckpointTag;
use crate::work::WorkItem;

/// Execution gate for the queue. Only `Running` drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueGate {
    Running,
    Paused,
    Stopped,
}

/// FIFO of work items with tag-ordered admission.
#[derive(Debug)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
    last_admitted: CheckpointTag,
    gate: QueueGate,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            last_admitted: CheckpointTag::ZERO,
            gate: QueueGate::Stopped,
        }
    }

    /// Clear all items and restart admission from `zero_tag`.
    pub fn initialize(&mut self, zero_tag: CheckpointTag) {
        self.items.clear();
        self.last_admitted = zero_tag;
        self.gate = QueueGate::Stopped;
    }

    /// Admit an item at `tag`.
    ///
    /// The tag must exceed the last admitted tag; with `allow_current`
    /// it may also equal it (progress reports re-use the position of
    /// the event they follow). A violation is a programming error in
    /// the feed and faults the projection.
    pub fn enqueue(&mut self, item: WorkItem, tag: CheckpointTag, allow_current: bool) -> Result<()> {
        let admitted = tag > self.last_admitted || (allow_current && tag == self.last_admitted);
        if !admitted {
            return Err(ProjectionError::OrderViolation {
                last: self.last_admitted,
                attempted: tag,
            });
        }

        self.last_admitted = tag;
        self.items.push_back(item);
        Ok(())
    }

    /// Admit an item without tag validation (state queries).
    pub fn enqueue_out_of_order(&mut self, item: WorkItem) {
        self.items.push_back(item);
    }

    /// Pop the next item, only while the gate is `Running`.
    pub fn dequeue(&mut self) -> Option<WorkItem> {
        if self.gate != QueueGate::Running {
            return None;
        }
        self.items.pop_front()
    }

    pub fn set_running(&mut self) {
        self.gate = QueueGate::Running;
    }

    pub fn set_paused(&mut self) {
        self.gate = QueueGate::Paused;
    }

    pub fn set_stopped(&mut self) {
        self.gate = QueueGate::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.gate == QueueGate::Running
    }

    /// Tag of the most recently admitted item.
    pub fn last_admitted_tag(&self) -> CheckpointTag {
        self.last_admitted
    }

    /// Number of buffered items, reported in statistics and used for
    /// pending-events pressure.
    pub fn buffered_event_count(&self) -> usize {
        self.items.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
