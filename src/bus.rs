//! Bus message types.
//!
//! All runtime inputs arrive as [`ProjectionMessage`]s and all outputs
//! leave as [`ProjectionOutput`]s through an injected [`OutputBus`].
//! There is no process-wide singleton: whoever wires the projection
//! decides where publishes go.

use uuid::Uuid;

use crate::config::ProjectionMode;
use crate::reader::BackwardReadCompleted;
use crate::tag::CheckpointTag;
use crate::work::CommittedEvent;

/// Inputs consumed by the projection runtime.
#[derive(Debug, Clone)]
pub enum ProjectionMessage {
    /// Begin the start sequence from `Initial`.
    Start,
    /// Stop the projection, flushing a final checkpoint.
    Stop,
    /// Pause processing until the in-flight checkpoint completes.
    PauseRequested,
    /// Tear everything down and start again from `Initial`.
    RestartRequested,
    /// Out-of-band partition state query.
    GetState {
        correlation_id: Uuid,
        partition: String,
    },
    /// Publish a statistics report.
    UpdateStatistics,
    /// Self-scheduled wakeup to drain the queue.
    Tick,

    /// Subscription feed: a committed event at its position.
    CommittedEventReceived {
        /// Subscription message sequence number, checked by the guard
        sequence: u64,
        event: CommittedEvent,
    },
    /// Subscription feed: reader progress changed.
    ProgressChanged { sequence: u64, progress: f32 },
    /// Subscription feed: pressure suggests writing a checkpoint.
    CheckpointSuggested {
        sequence: u64,
        tag: CheckpointTag,
        progress: f32,
    },

    /// Checkpoint manager: persisted checkpoint finished loading.
    CheckpointLoaded {
        tag: Option<CheckpointTag>,
        state: Option<String>,
    },
    /// Checkpoint manager: a checkpoint write completed at `tag`.
    CheckpointCompleted { tag: CheckpointTag },

    /// Read dispatcher: a backward read page arrived.
    ReadStreamEventsBackwardCompleted(BackwardReadCompleted),
}

/// Statistics snapshot published on `UpdateStatistics`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsReport {
    /// Current lifecycle phase name
    pub status: String,
    /// Partitioning mode
    pub mode: ProjectionMode,
    /// Projection name
    pub name: String,
    /// Fault reason when faulted, empty otherwise
    pub state_reason: String,
    /// Work items buffered in the queue
    pub buffered_events: usize,
    /// Partitions currently cached
    pub partitions_cached: usize,
}

/// Outputs published by the projection runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionOutput {
    /// Subscribe to the event feed from `from`.
    Subscribe {
        from: CheckpointTag,
        checkpoint_unhandled_bytes_threshold: usize,
    },
    /// Drop the subscription.
    Unsubscribe,
    /// The projection is running.
    Started,
    /// The projection stopped cleanly.
    Stopped,
    /// The projection faulted.
    Faulted { reason: String },
    /// Reply to a `GetState` query.
    StateReport {
        correlation_id: Uuid,
        partition: String,
        state: Option<String>,
    },
    /// Statistics snapshot.
    Statistics(StatisticsReport),
    /// Self-scheduled wakeup; must be routed back into the input feed.
    Tick,
}

/// Message-typed send capability injected into the runtime.
pub trait OutputBus {
    fn publish(&mut self, output: ProjectionOutput);
}
