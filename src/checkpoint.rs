//! Checkpoint manager contract.
//!
//! The manager owns durable writes: emitted-event batches and the
//! checkpoint markers that gate their visibility. Its implementation
//! lives outside the runtime; completions come back as bus messages
//! (`CheckpointLoaded`, `CheckpointCompleted`, `CheckpointSuggested`).

use crate::tag::CheckpointTag;
use crate::work::EmittedEvent;

/// Operations the runtime drives on its checkpoint manager.
///
/// All calls are fire-and-forget: the manager may buffer work until a
/// checkpoint boundary, and it reports completion asynchronously. The
/// one hard obligation is that
/// [`request_checkpoint_to_stop`](Self::request_checkpoint_to_stop)
/// always eventually produces a `CheckpointCompleted`, even when
/// nothing needed writing - stop and fault handling depend on it.
pub trait CheckpointManager {
    /// Reset all in-memory checkpoint state.
    fn initialize(&mut self);

    /// Begin tracking progress from `from_tag`.
    fn start(&mut self, from_tag: CheckpointTag);

    /// Begin loading the persisted checkpoint; completion arrives as a
    /// `CheckpointLoaded` message.
    fn begin_load_state(&mut self);

    /// Record the work of one item: the projection state as of `tag`,
    /// the emissions scheduled by it, and current reader progress.
    fn event_processed(
        &mut self,
        current_state: Option<&str>,
        emissions: Vec<EmittedEvent>,
        tag: CheckpointTag,
        progress: f32,
    );

    /// Flush a final checkpoint. Must always complete with a
    /// `CheckpointCompleted`, even as a no-op.
    fn request_checkpoint_to_stop(&mut self);

    /// The projection is entering its stopping phase.
    fn stopping(&mut self);

    /// The projection has fully stopped.
    fn stopped(&mut self);
}
