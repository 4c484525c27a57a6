//! User handler contract.
//!
//! The handler is the projection's query: it folds committed events
//! into per-partition state and may emit derived events. It runs to
//! completion synchronously; the runtime loads it with the right
//! partition's state before each invocation.

use thiserror::Error;
use uuid::Uuid;

use crate::tag::CheckpointTag;
use crate::work::EmittedEvent;

/// Failure reported by a handler. The runtime converts it into a
/// projection fault carrying the projection name and event position.
#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Everything the handler sees about one committed event.
#[derive(Debug)]
pub struct EventEnvelope<'a> {
    /// Position of the event on the feed
    pub tag: CheckpointTag,
    /// Source stream
    pub stream_id: &'a str,
    /// Event type name
    pub event_type: &'a str,
    /// Category of the source stream, when it has one
    pub category: Option<&'a str>,
    /// Unique event identity
    pub event_id: Uuid,
    /// Sequence number within the source stream
    pub sequence_number: u64,
    /// Writer-attached metadata
    pub metadata: Option<&'a str>,
    /// Event payload
    pub data: &'a str,
}

/// What one handler invocation produced.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    /// Whether the event was actually processed (unprocessed events
    /// still advance the checkpoint but schedule nothing)
    pub processed: bool,
    /// New partition state, when it changed
    pub new_state: Option<String>,
    /// Derived events to persist, atomic with this event's checkpoint
    pub emitted: Vec<EmittedEvent>,
}

/// A stateful event handler owned by the projection runtime.
///
/// The runtime tracks which partition is loaded and calls
/// [`initialize`](Self::initialize) or [`load`](Self::load) only when
/// the active partition changes.
pub trait ProjectionHandler {
    /// Reset to the empty state of a fresh partition.
    fn initialize(&mut self) -> Result<(), HandlerError>;

    /// Load previously produced partition state.
    fn load(&mut self, state: &str) -> Result<(), HandlerError>;

    /// Fold one committed event into the loaded state.
    fn process_event(&mut self, event: &EventEnvelope<'_>) -> Result<HandlerOutcome, HandlerError>;

    /// Short description used in fault reasons and logs.
    fn description(&self) -> &str {
        "projection-handler"
    }
}
