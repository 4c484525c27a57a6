//! Source definition: event filtering, position tagging, partition
//! selection, and the stream-name scheme.
//!
//! The projection mode fixes all of these together, so they live behind
//! one type the runtime consults for every incoming event.

use crate::cache::ROOT_PARTITION;
use crate::config::ProjectionMode;
use crate::tag::CheckpointTag;
use crate::work::CommittedEvent;

/// Event type under which partition state is persisted for recovery.
pub const STATE_UPDATED_EVENT_TYPE: &str = "StateUpdated";

/// Classifies incoming events and maps them onto partitions and streams.
#[derive(Debug, Clone)]
pub struct SourceDefinition {
    name: String,
    mode: ProjectionMode,
}

impl SourceDefinition {
    pub fn new(name: impl Into<String>, mode: ProjectionMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }

    /// The tag preceding every position this source can produce.
    pub fn zero_tag(&self) -> CheckpointTag {
        CheckpointTag::ZERO
    }

    /// Whether the projection processes this event at all.
    ///
    /// System streams and system event types (`$`-prefixed) are never
    /// fed to user handlers.
    pub fn accepts(&self, stream_id: &str, event_type: &str) -> bool {
        !stream_id.starts_with('$') && !event_type.starts_with('$')
    }

    /// Category of a stream id, by the `<category>-<id>` convention.
    pub fn category_of<'a>(&self, stream_id: &'a str) -> Option<&'a str> {
        stream_id.split_once('-').map(|(category, _)| category)
    }

    /// Partition key a committed event belongs to.
    pub fn partition_for(&self, event: &CommittedEvent) -> String {
        match self.mode {
            ProjectionMode::Single => ROOT_PARTITION.to_string(),
            ProjectionMode::ByStream => event.stream_id.clone(),
            ProjectionMode::ByCategory => self
                .category_of(&event.stream_id)
                .unwrap_or(ROOT_PARTITION)
                .to_string(),
        }
    }

    /// Stream holding the root projection state.
    pub fn state_stream(&self) -> String {
        format!("$projections-{}-state", self.name)
    }

    /// Stream holding one partition's `StateUpdated` history.
    pub fn partition_state_stream(&self, partition: &str) -> String {
        if partition == ROOT_PARTITION {
            self.state_stream()
        } else {
            format!("$projections-{}-{}-state", self.name, partition)
        }
    }

    /// Stream holding the projection's checkpoint markers.
    pub fn checkpoint_stream(&self) -> String {
        format!("$projections-{}-checkpoint", self.name)
    }
}
