//! Checkpoint tags - totally ordered positions on the event feed.
//!
//! Tags are the sole currency for ordering work items, locking cache
//! entries, and recording progress. They round-trip through JSON so they
//! can live in `StateUpdated` metadata and persisted checkpoint payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProjectionError, Result};

/// Immutable position marker with total ordering.
///
/// The ordering is lexicographic: commit position, then prepare position.
/// The zero tag precedes every real position on the feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CheckpointTag {
    /// Commit position on the global event feed
    pub commit_position: u64,
    /// Prepare position within the commit
    pub prepare_position: u64,
}

impl CheckpointTag {
    /// Tag preceding every real position
    pub const ZERO: CheckpointTag = CheckpointTag {
        commit_position: 0,
        prepare_position: 0,
    };

    /// Create a tag from commit and prepare positions.
    pub const fn new(commit_position: u64, prepare_position: u64) -> Self {
        Self {
            commit_position,
            prepare_position,
        }
    }

    /// Serialize to the JSON form stored in event metadata and
    /// checkpoint payloads.
    pub fn to_json(&self) -> String {
        // Serialization of a two-field struct of integers cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl PartialOrd for CheckpointTag {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CheckpointTag {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.commit_position.cmp(&other.commit_position) {
            std::cmp::Ordering::Equal => self.prepare_position.cmp(&other.prepare_position),
            other => other,
        }
    }
}

impl fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/P:{}", self.commit_position, self.prepare_position)
    }
}

/// Identity of a projection's persisted payload schema.
///
/// A payload written under a different version is treated as absent,
/// so the projection starts from the zero tag instead of resuming from
/// state it can no longer interpret.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectionVersion {
    /// Projection identity
    pub id: u64,
    /// Incremented when the projection is re-created
    pub epoch: u64,
    /// Incremented when the query or state schema changes
    pub version: u64,
}

impl ProjectionVersion {
    pub const fn new(id: u64, epoch: u64, version: u64) -> Self {
        Self { id, epoch, version }
    }
}

/// Parsed checkpoint payload: the version it was written under, the tag
/// if one was recorded, and any extra metadata the writer attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaggedPayload {
    #[serde(rename = "$v")]
    pub version: ProjectionVersion,
    #[serde(rename = "$s", skip_serializing_if = "Option::is_none", default)]
    pub tag: Option<CheckpointTag>,
    #[serde(rename = "$m", skip_serializing_if = "Option::is_none", default)]
    pub extra_metadata: Option<serde_json::Value>,
}

/// Parse a checkpoint tag from JSON. Empty input means no tag.
pub fn parse_tag(json: &[u8]) -> Result<Option<CheckpointTag>> {
    if json.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(json)
        .map(Some)
        .map_err(|e| ProjectionError::TagParse(e.to_string()))
}

/// Parse a versioned checkpoint payload.
///
/// Empty input yields the current version with no tag. A payload whose
/// version does not match `current` has its tag discarded: the caller
/// must start from zero rather than resume from an incompatible
/// position.
pub fn parse_tag_with_version(
    bytes: &[u8],
    current: &ProjectionVersion,
) -> Result<TaggedPayload> {
    if bytes.is_empty() {
        return Ok(TaggedPayload {
            version: *current,
            tag: None,
            extra_metadata: None,
        });
    }

    let mut payload: TaggedPayload =
        serde_json::from_slice(bytes).map_err(|e| ProjectionError::TagParse(e.to_string()))?;

    if payload.version != *current {
        payload.tag = None;
    }

    Ok(payload)
}
