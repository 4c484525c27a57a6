//! Work items - the units queued and executed by the runtime.
//!
//! A work item carries the tag it was admitted at and everything its
//! execution needs. Items are immutable once enqueued; the runtime pops
//! them in admission order and executes them against its collaborators.

use uuid::Uuid;

use crate::tag::CheckpointTag;

/// A committed event delivered by the subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEvent {
    /// Position of the event on the feed
    pub tag: CheckpointTag,
    /// Stream the event was written to
    pub stream_id: String,
    /// Event type name
    pub event_type: String,
    /// Unique event identity
    pub event_id: Uuid,
    /// Sequence number within the stream
    pub sequence_number: u64,
    /// Opaque metadata attached by the writer
    pub metadata: Option<String>,
    /// Event payload
    pub data: String,
}

/// A derived event produced by the handler, persisted to an
/// event-store stream by the checkpoint manager.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    /// Target stream
    pub stream: String,
    /// Unique event identity
    pub event_id: Uuid,
    /// Event type name
    pub event_type: String,
    /// Event payload
    pub data: String,
    /// Metadata (JSON checkpoint tag for state updates)
    pub metadata: Option<String>,
}

/// One unit of queued work.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Process a committed event through the handler.
    CommittedEvent {
        event: CommittedEvent,
        /// Partition the event belongs to, per the source definition
        partition: String,
        /// Cache-lock owner token for this item
        owner: u64,
    },

    /// Report reader progress to the checkpoint manager.
    Progress { tag: CheckpointTag, progress: f32 },

    /// Pause at a checkpoint boundary until the write completes.
    CheckpointSuggested { tag: CheckpointTag, progress: f32 },

    /// Out-of-band partition state query.
    GetState {
        correlation_id: Uuid,
        partition: String,
    },
}

impl WorkItem {
    /// The tag this item was admitted at; `None` for out-of-order items.
    pub fn tag(&self) -> Option<CheckpointTag> {
        match self {
            WorkItem::CommittedEvent { event, .. } => Some(event.tag),
            WorkItem::Progress { tag, .. } => Some(*tag),
            WorkItem::CheckpointSuggested { tag, .. } => Some(*tag),
            WorkItem::GetState { .. } => None,
        }
    }
}
