//! Read dispatcher contract for partition state recovery.
//!
//! Backward reads are fire-and-forget: the runtime records the
//! correlation id, the reader answers later with a
//! `ReadStreamEventsBackwardCompleted` message on the same thread.
//! Requests canceled by a restart must never surface a late reply.

use uuid::Uuid;

/// An event returned by a backward stream read.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Sequence number within the stream
    pub event_number: u64,
    /// Event type name
    pub event_type: String,
    /// Event payload
    pub data: String,
    /// Writer-attached metadata
    pub metadata: Option<String>,
}

/// Reply to one backward read request, newest event first.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardReadCompleted {
    /// Correlation id of the request being answered
    pub correlation_id: Uuid,
    /// Page of events, newest first
    pub events: Vec<RecordedEvent>,
    /// Where the next page starts, when the stream continues
    pub next_event_number: Option<u64>,
    /// Whether this page reached the beginning of the stream
    pub is_end_of_stream: bool,
}

/// Asynchronous backward reads against event-store streams.
pub trait StreamReader {
    /// Request a page of `max_count` events read backward from
    /// `from_event_number` (`None` = from the stream end).
    fn read_backward(
        &mut self,
        correlation_id: Uuid,
        stream: &str,
        from_event_number: Option<u64>,
        max_count: usize,
    );

    /// Cancel an outstanding request; its reply must be suppressed.
    fn cancel(&mut self, correlation_id: Uuid);
}
