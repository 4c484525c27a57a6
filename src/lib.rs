//! Projection runtime for an event-sourced store.
//!
//! A projection subscribes to the ordered feed of committed events,
//! folds each event through a user-supplied handler into per-partition
//! state, emits derived events, and periodically persists a checkpoint
//! so processing resumes exactly after a restart.
//!
//! ## Architecture
//!
//! The runtime handles:
//! - Lifecycle transitions (start, pause, stop, restart, fault)
//! - Tag-ordered work admission and draining
//! - Partition state caching with position-based locking
//! - Partition state recovery from `StateUpdated` streams
//! - Subscription sequence filtering
//!
//! Collaborators plug in behind traits:
//! - [`ProjectionHandler`] - the user's fold over committed events
//! - [`CheckpointManager`] - durable emissions and checkpoint markers
//! - [`StreamReader`] - backward reads for state recovery
//! - [`OutputBus`] - message-typed publish back to the host
//!
//! ## Execution model
//!
//! Single-threaded and cooperative. Every input arrives as a
//! [`ProjectionMessage`]; nothing inside the runtime blocks. Waiting is
//! expressed by parking the work queue until the awaited reply message
//! arrives, and wakeups are coalesced through a single in-flight
//! [`ProjectionOutput::Tick`].

pub mod bus;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod handler;
pub mod queue;
pub mod reader;
pub mod runtime;
pub mod source;
pub mod tag;
pub mod work;
pub mod worker;

pub use bus::{OutputBus, ProjectionMessage, ProjectionOutput, StatisticsReport};
pub use cache::{PartitionStateCache, ROOT_PARTITION};
pub use checkpoint::CheckpointManager;
pub use config::{ProjectionConfig, ProjectionMode};
pub use error::{ProjectionError, Result};
pub use handler::{EventEnvelope, HandlerError, HandlerOutcome, ProjectionHandler};
pub use queue::{QueueGate, WorkQueue};
pub use reader::{BackwardReadCompleted, RecordedEvent, StreamReader};
pub use runtime::{ProjectionPhase, ProjectionRuntime};
pub use source::{STATE_UPDATED_EVENT_TYPE, SourceDefinition};
pub use tag::{
    CheckpointTag, ProjectionVersion, TaggedPayload, parse_tag, parse_tag_with_version,
};
pub use work::{CommittedEvent, EmittedEvent, WorkItem};
pub use worker::{ChannelBus, ProjectionWorker};
