//! Error types for the projection runtime

use thiserror::Error;

use crate::tag::CheckpointTag;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors raised while driving a projection.
///
/// None of these cross the runtime boundary: the state machine catches
/// them at the dispatch layer and converts them into a `Faulted(reason)`
/// status. `StateLoad` faults the projection directly (there is no
/// in-flight work to flush); everything else goes through the
/// faulted-stopping path so a final checkpoint can still be written.
#[derive(Error, Debug, Clone)]
pub enum ProjectionError {
    #[error("{message} not allowed in phase {phase}")]
    InvalidPhase { phase: String, message: String },

    #[error("work admitted out of order: {attempted} after {last}")]
    OrderViolation {
        last: CheckpointTag,
        attempted: CheckpointTag,
    },

    #[error("partition '{key}' is locked at {locked_at} by another owner, cannot lock at {attempted}")]
    CacheLockConflict {
        key: String,
        locked_at: CheckpointTag,
        attempted: CheckpointTag,
    },

    #[error("no partition state cached for '{0}'")]
    PartitionStateMissing(String),

    #[error("projection {projection} handler {handler} failed at {position}: {message}")]
    Handler {
        projection: String,
        handler: String,
        position: CheckpointTag,
        message: String,
    },

    #[error("emit not allowed by the projection/configuration/mode")]
    EmitNotAllowed,

    #[error("state load failed: {0}")]
    StateLoad(String),

    #[error("malformed checkpoint tag: {0}")]
    TagParse(String),
}
