//! Projection configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the projection partitions its state.
///
/// The mode selects the source definition: which partition a committed
/// event belongs to and therefore which state the handler is loaded
/// with before processing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionMode {
    /// Single state shared by all events (root partition only)
    Single,
    /// One partition per source stream
    ByStream,
    /// One partition per stream category
    ByCategory,
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionMode::Single => write!(f, "single"),
            ProjectionMode::ByStream => write!(f, "by-stream"),
            ProjectionMode::ByCategory => write!(f, "by-category"),
        }
    }
}

/// Options governing a single projection.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Projection name, used in stream names and status reports
    pub name: String,
    /// Partitioning mode
    pub mode: ProjectionMode,
    /// When false, checkpoint suggestions are ignored entirely
    pub checkpoints_enabled: bool,
    /// When false, a handler returning emitted events faults the projection
    pub emit_event_enabled: bool,
    /// When true, partition state changes are persisted as `StateUpdated`
    /// events so recovery can reconstruct them
    pub publish_state_updates: bool,
    /// Queue depth above which a checkpoint boundary is forced
    pub pending_events_threshold: usize,
    /// Unhandled-bytes pressure knob handed to the subscriber
    pub checkpoint_unhandled_bytes_threshold: usize,
}

impl ProjectionConfig {
    /// Configuration with production defaults.
    pub fn new(name: impl Into<String>, mode: ProjectionMode) -> Self {
        Self {
            name: name.into(),
            mode,
            checkpoints_enabled: true,
            emit_event_enabled: false,
            publish_state_updates: true,
            pending_events_threshold: 1000,
            checkpoint_unhandled_bytes_threshold: 10 * 1024 * 1024,
        }
    }
}
