//! Projection runtime - lifecycle state machine and processing loop.
//!
//! Single-threaded and cooperative: every input is a message, every
//! output is a publish, and waiting is modeled by parking the queue
//! until the awaited reply arrives. Invariants are maintained by
//! message ordering, not locks.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::bus::{OutputBus, ProjectionMessage, ProjectionOutput, StatisticsReport};
use crate::cache::{PartitionStateCache, ROOT_PARTITION};
use crate::checkpoint::CheckpointManager;
use crate::config::ProjectionConfig;
use crate::error::{ProjectionError, Result};
use crate::handler::{EventEnvelope, ProjectionHandler};
use crate::queue::WorkQueue;
use crate::reader::{BackwardReadCompleted, StreamReader};
use crate::source::{STATE_UPDATED_EVENT_TYPE, SourceDefinition};
use crate::tag::{CheckpointTag, parse_tag};
use crate::work::{CommittedEvent, EmittedEvent, WorkItem};

/// Events fetched per backward read page during state recovery.
const STATE_READ_BATCH: usize = 32;

/// Lifecycle phase of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionPhase {
    Initial,
    LoadStateRequested,
    StateLoadedSubscribed,
    Running,
    Paused,
    Resumed,
    Stopping,
    Stopped,
    FaultedStopping,
    Faulted,
}

impl fmt::Display for ProjectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectionPhase::Initial => "Initial",
            ProjectionPhase::LoadStateRequested => "LoadStateRequested",
            ProjectionPhase::StateLoadedSubscribed => "StateLoadedSubscribed",
            ProjectionPhase::Running => "Running",
            ProjectionPhase::Paused => "Paused",
            ProjectionPhase::Resumed => "Resumed",
            ProjectionPhase::Stopping => "Stopping",
            ProjectionPhase::Stopped => "Stopped",
            ProjectionPhase::FaultedStopping => "FaultedStopping",
            ProjectionPhase::Faulted => "Faulted",
        };
        write!(f, "{name}")
    }
}

/// A committed-event work item parked while its partition state is
/// recovered from the state stream.
#[derive(Debug)]
struct PendingStateLoad {
    partition: String,
    owner: u64,
    event: CommittedEvent,
    stream: String,
}

/// The per-projection runtime.
///
/// Owns its queue, cache, checkpoint manager, and handler exclusively.
/// Collaborators are injected capabilities: the read dispatcher for
/// partition state recovery and the output side of the bus.
pub struct ProjectionRuntime<H, C, R, B>
where
    H: ProjectionHandler,
    C: CheckpointManager,
    R: StreamReader,
    B: OutputBus,
{
    config: ProjectionConfig,
    source: SourceDefinition,
    handler: H,
    checkpoints: C,
    reader: R,
    bus: B,

    phase: ProjectionPhase,
    fault_reason: Option<String>,
    cache: PartitionStateCache,
    queue: WorkQueue,

    /// Next expected subscription sequence number; `None` = unarmed
    expected_sequence: Option<u64>,
    /// At most one Tick in flight at a time
    tick_pending: bool,
    /// Partition whose state the handler currently holds
    current_partition: Option<String>,
    /// Latest reader progress, forwarded with every finalize
    last_progress: f32,
    /// One pending-events checkpoint boundary at a time
    pressure_suggested: bool,
    /// Owner tokens for cache locks, one per committed work item
    next_owner: u64,
    /// Outstanding backward reads, keyed by correlation id
    load_state_requests: HashMap<Uuid, PendingStateLoad>,
}

impl<H, C, R, B> ProjectionRuntime<H, C, R, B>
where
    H: ProjectionHandler,
    C: CheckpointManager,
    R: StreamReader,
    B: OutputBus,
{
    pub fn new(config: ProjectionConfig, handler: H, checkpoints: C, reader: R, bus: B) -> Self {
        let source = SourceDefinition::new(config.name.clone(), config.mode);
        Self {
            config,
            source,
            handler,
            checkpoints,
            reader,
            bus,
            phase: ProjectionPhase::Initial,
            fault_reason: None,
            cache: PartitionStateCache::new(),
            queue: WorkQueue::new(),
            expected_sequence: None,
            tick_pending: false,
            current_partition: None,
            last_progress: 0.0,
            pressure_suggested: false,
            next_owner: 0,
            load_state_requests: HashMap::new(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ProjectionPhase {
        self.phase
    }

    /// Fault reason, once faulted.
    pub fn fault_reason(&self) -> Option<&str> {
        self.fault_reason.as_deref()
    }

    /// Cached state of a partition, if present.
    pub fn partition_state(&self, key: &str) -> Option<&str> {
        self.cache.peek(key)
    }

    /// The handler this runtime drives.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Feed one message into the runtime.
    ///
    /// Errors never escape: a failed dispatch drives the state machine
    /// into the faulted-stopping path (or directly to `Faulted` for
    /// state-load failures, which have no in-flight work to flush).
    pub fn handle(&mut self, message: ProjectionMessage) {
        if let Err(error) = self.dispatch(message) {
            match error {
                ProjectionError::StateLoad(_) => self.set_faulted(error.to_string()),
                other => self.set_faulting(other.to_string()),
            }
        }
    }

    fn dispatch(&mut self, message: ProjectionMessage) -> Result<()> {
        use ProjectionPhase::*;

        match message {
            ProjectionMessage::Start => {
                self.ensure_phase(&[Initial], "Start")?;
                self.begin_load_state();
                Ok(())
            }

            ProjectionMessage::Stop => {
                self.ensure_phase(
                    &[StateLoadedSubscribed, Running, Paused, Resumed],
                    "Stop",
                )?;
                self.go_stopping();
                Ok(())
            }

            ProjectionMessage::PauseRequested => {
                self.ensure_phase(&[Running], "PauseRequested")?;
                self.go_paused();
                Ok(())
            }

            ProjectionMessage::RestartRequested => {
                tracing::info!("[{}] restart requested", self.config.name);
                self.go_initial();
                self.begin_load_state();
                Ok(())
            }

            ProjectionMessage::GetState {
                correlation_id,
                partition,
            } => {
                self.ensure_phase(&[Running, Paused, Resumed], "GetState")?;
                self.queue.enqueue_out_of_order(WorkItem::GetState {
                    correlation_id,
                    partition,
                });
                self.ensure_tick();
                Ok(())
            }

            ProjectionMessage::UpdateStatistics => {
                self.publish_statistics();
                Ok(())
            }

            ProjectionMessage::Tick => {
                // Ticks that outlive a restart arrive unarmed: drop them
                if !self.tick_pending {
                    return Ok(());
                }
                self.tick_pending = false;
                self.drive_queue()
            }

            ProjectionMessage::CommittedEventReceived { sequence, event } => {
                if !self.guard_sequence(sequence) {
                    return Ok(());
                }
                self.ensure_phase(
                    &[Running, Paused, Resumed, Stopping],
                    "CommittedEventReceived",
                )?;
                self.committed_event_received(event)
            }

            ProjectionMessage::ProgressChanged { sequence, progress } => {
                if !self.guard_sequence(sequence) {
                    return Ok(());
                }
                self.ensure_phase(
                    &[Running, Paused, Resumed, Stopping],
                    "ProgressChanged",
                )?;
                self.last_progress = progress;
                let tag = self.queue.last_admitted_tag();
                self.queue
                    .enqueue(WorkItem::Progress { tag, progress }, tag, true)?;
                self.ensure_tick();
                Ok(())
            }

            ProjectionMessage::CheckpointSuggested {
                sequence,
                tag,
                progress,
            } => {
                if !self.guard_sequence(sequence) {
                    return Ok(());
                }
                if !self.config.checkpoints_enabled {
                    return Ok(());
                }
                self.ensure_phase(
                    &[Running, Paused, Resumed, Stopping, FaultedStopping],
                    "CheckpointSuggested",
                )?;
                self.queue
                    .enqueue(WorkItem::CheckpointSuggested { tag, progress }, tag, false)?;
                self.ensure_tick();
                Ok(())
            }

            ProjectionMessage::CheckpointLoaded { tag, state } => {
                self.ensure_phase(&[LoadStateRequested], "CheckpointLoaded")?;
                self.state_loaded(tag, state)
            }

            ProjectionMessage::CheckpointCompleted { tag } => {
                self.ensure_phase(
                    &[Running, Paused, Resumed, Stopping, FaultedStopping],
                    "CheckpointCompleted",
                )?;
                self.checkpoint_completed(tag);
                Ok(())
            }

            ProjectionMessage::ReadStreamEventsBackwardCompleted(page) => {
                self.state_read_completed(page)
            }
        }
    }

    // === Lifecycle transitions ===

    /// Entry action for `Initial`: tear down every piece of mutable
    /// state so nothing from the previous incarnation can leak in.
    fn go_initial(&mut self) {
        for correlation_id in self.load_state_requests.keys() {
            self.reader.cancel(*correlation_id);
        }
        self.load_state_requests.clear();

        self.cache.initialize();
        self.queue.initialize(self.source.zero_tag());
        self.checkpoints.initialize();
        self.tick_pending = false;
        self.expected_sequence = None;
        self.current_partition = None;
        self.last_progress = 0.0;
        self.pressure_suggested = false;
        self.fault_reason = None;
        self.phase = ProjectionPhase::Initial;
    }

    fn begin_load_state(&mut self) {
        self.phase = ProjectionPhase::LoadStateRequested;
        self.checkpoints.begin_load_state();
    }

    /// `CheckpointLoaded` handler: subscribe from the loaded tag and
    /// start running.
    fn state_loaded(&mut self, tag: Option<CheckpointTag>, state: Option<String>) -> Result<()> {
        let from = tag.unwrap_or_else(|| self.source.zero_tag());
        tracing::info!("[{}] checkpoint loaded, subscribing from {}", self.config.name, from);

        if let Some(state) = state {
            self.cache
                .cache_and_lock(ROOT_PARTITION, state, None, None)?;
        }

        self.queue.initialize(from);
        self.checkpoints.start(from);

        // The subscriber's first message is numbered 0: arm the guard
        // before the subscription request goes out
        self.expected_sequence = Some(0);
        self.bus.publish(ProjectionOutput::Subscribe {
            from,
            checkpoint_unhandled_bytes_threshold: self
                .config
                .checkpoint_unhandled_bytes_threshold,
        });

        self.phase = ProjectionPhase::StateLoadedSubscribed;
        self.bus.publish(ProjectionOutput::Started);
        self.go_running();
        Ok(())
    }

    fn go_running(&mut self) {
        self.phase = ProjectionPhase::Running;
        self.queue.set_running();
        self.ensure_tick();
    }

    fn go_paused(&mut self) {
        tracing::debug!("[{}] paused", self.config.name);
        self.phase = ProjectionPhase::Paused;
        self.queue.set_paused();
    }

    fn go_stopping(&mut self) {
        tracing::info!("[{}] stopping", self.config.name);
        self.phase = ProjectionPhase::Stopping;
        self.queue.set_paused();
        self.bus.publish(ProjectionOutput::Unsubscribe);
        self.checkpoints.stopping();
        self.checkpoints.request_checkpoint_to_stop();
    }

    /// Drive the machine into the faulted-stopping path, preserving
    /// the in-flight checkpoint.
    fn set_faulting(&mut self, reason: String) {
        if matches!(
            self.phase,
            ProjectionPhase::FaultedStopping | ProjectionPhase::Faulted
        ) {
            return;
        }
        tracing::warn!("[{}] faulting: {}", self.config.name, reason);
        self.fault_reason = Some(reason);
        self.phase = ProjectionPhase::FaultedStopping;
        self.queue.set_paused();
        self.bus.publish(ProjectionOutput::Unsubscribe);
        self.checkpoints.request_checkpoint_to_stop();
    }

    /// Fault immediately, with no checkpoint to flush.
    fn set_faulted(&mut self, reason: String) {
        if self.phase == ProjectionPhase::Faulted {
            return;
        }
        tracing::error!("[{}] faulted: {}", self.config.name, reason);
        self.fault_reason = Some(reason.clone());
        self.phase = ProjectionPhase::Faulted;
        self.queue.set_stopped();
        self.bus.publish(ProjectionOutput::Faulted { reason });
    }

    /// `CheckpointCompleted` is the unlock signal: purge covered cache
    /// entries, then advance whichever wait was in progress.
    fn checkpoint_completed(&mut self, tag: CheckpointTag) {
        self.cache.unlock(tag);
        self.pressure_suggested = false;

        match self.phase {
            ProjectionPhase::Paused => {
                self.phase = ProjectionPhase::Resumed;
                self.go_running();
            }
            ProjectionPhase::Stopping => {
                tracing::info!("[{}] stopped at {}", self.config.name, tag);
                self.phase = ProjectionPhase::Stopped;
                self.queue.set_stopped();
                self.checkpoints.stopped();
                self.bus.publish(ProjectionOutput::Stopped);
            }
            ProjectionPhase::FaultedStopping => {
                let reason = self.fault_reason.clone().unwrap_or_default();
                self.phase = ProjectionPhase::Faulted;
                self.queue.set_stopped();
                self.bus.publish(ProjectionOutput::Faulted { reason });
            }
            // Periodic checkpoints complete while running: unlock only
            _ => {}
        }
    }

    // === Input plumbing ===

    fn ensure_phase(&self, allowed: &[ProjectionPhase], message: &str) -> Result<()> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        Err(ProjectionError::InvalidPhase {
            phase: self.phase.to_string(),
            message: message.to_string(),
        })
    }

    /// Subscription sequence guard: exactly-once despite duplicates
    /// and reorderings. Returns whether the message should be applied.
    fn guard_sequence(&mut self, sequence: u64) -> bool {
        match self.expected_sequence {
            Some(expected) if sequence == expected => {
                self.expected_sequence = Some(expected + 1);
                true
            }
            _ => {
                tracing::debug!(
                    "[{}] discarding subscription message {} (expected {:?})",
                    self.config.name,
                    sequence,
                    self.expected_sequence
                );
                false
            }
        }
    }

    fn ensure_tick(&mut self) {
        if !matches!(
            self.phase,
            ProjectionPhase::Running | ProjectionPhase::Stopping | ProjectionPhase::FaultedStopping
        ) {
            return;
        }
        if self.tick_pending {
            return;
        }
        self.tick_pending = true;
        self.bus.publish(ProjectionOutput::Tick);
    }

    fn publish_statistics(&mut self) {
        let report = StatisticsReport {
            status: self.phase.to_string(),
            mode: self.config.mode,
            name: self.config.name.clone(),
            state_reason: self.fault_reason.clone().unwrap_or_default(),
            buffered_events: self.queue.buffered_event_count(),
            partitions_cached: self.cache.cached_item_count(),
        };
        self.bus.publish(ProjectionOutput::Statistics(report));
    }

    // === Committed event intake ===

    fn committed_event_received(&mut self, event: CommittedEvent) -> Result<()> {
        if !self.source.accepts(&event.stream_id, &event.event_type) {
            return Ok(());
        }

        let partition = self.source.partition_for(&event);
        let owner = self.next_owner;
        self.next_owner += 1;

        let tag = event.tag;
        self.queue.enqueue(
            WorkItem::CommittedEvent {
                event,
                partition,
                owner,
            },
            tag,
            false,
        )?;

        // Pending-events pressure: force a checkpoint boundary so the
        // backlog becomes durable before it grows further
        if self.config.checkpoints_enabled
            && !self.pressure_suggested
            && self.queue.buffered_event_count() > self.config.pending_events_threshold
        {
            self.pressure_suggested = true;
            self.queue.enqueue(
                WorkItem::CheckpointSuggested {
                    tag,
                    progress: self.last_progress,
                },
                tag,
                true,
            )?;
        }

        self.ensure_tick();
        Ok(())
    }

    // === Queue draining ===

    /// Drain admitted work while running. A work item that must wait
    /// for a backward read parks the queue: the loop stops and resumes
    /// when the reply completes the item.
    fn drive_queue(&mut self) -> Result<()> {
        while self.queue.is_running() && self.load_state_requests.is_empty() {
            let Some(item) = self.queue.dequeue() else {
                break;
            };
            self.execute_work(item)?;
        }
        Ok(())
    }

    fn execute_work(&mut self, item: WorkItem) -> Result<()> {
        match item {
            WorkItem::CommittedEvent {
                event,
                partition,
                owner,
            } => {
                if partition == ROOT_PARTITION {
                    let state = self.cache.get_locked(ROOT_PARTITION)?.to_string();
                    return self.process_committed(event, partition, owner, state);
                }
                match self.cache.try_get_and_lock(&partition, event.tag, Some(owner))? {
                    Some(state) => self.process_committed(event, partition, owner, state),
                    None => {
                        self.begin_partition_load(partition, event, owner);
                        Ok(())
                    }
                }
            }

            WorkItem::Progress { tag, progress } => {
                self.last_progress = progress;
                self.finalize_event_processing(Vec::new(), tag, progress);
                Ok(())
            }

            WorkItem::CheckpointSuggested { tag, progress } => {
                // Pause at the boundary; CheckpointCompleted resumes us
                self.go_paused();
                self.finalize_event_processing(Vec::new(), tag, progress);
                Ok(())
            }

            WorkItem::GetState {
                correlation_id,
                partition,
            } => {
                let state = self.cache.peek(&partition).map(str::to_string);
                self.bus.publish(ProjectionOutput::StateReport {
                    correlation_id,
                    partition,
                    state,
                });
                Ok(())
            }
        }
    }

    /// The committed-event algorithm, once partition state is in hand.
    fn process_committed(
        &mut self,
        event: CommittedEvent,
        partition: String,
        owner: u64,
        state: String,
    ) -> Result<()> {
        if self.current_partition.as_deref() != Some(partition.as_str()) {
            let loaded = if state.is_empty() {
                self.handler.initialize()
            } else {
                self.handler.load(&state)
            };
            loaded.map_err(|e| self.handler_failure(event.tag, e.0))?;
            self.current_partition = Some(partition.clone());
        }

        let envelope = EventEnvelope {
            tag: event.tag,
            stream_id: &event.stream_id,
            event_type: &event.event_type,
            category: self.source.category_of(&event.stream_id),
            event_id: event.event_id,
            sequence_number: event.sequence_number,
            metadata: event.metadata.as_deref(),
            data: &event.data,
        };

        let outcome = self
            .handler
            .process_event(&envelope)
            .map_err(|e| self.handler_failure(event.tag, e.0))?;

        if !outcome.emitted.is_empty() && !self.config.emit_event_enabled {
            return Err(ProjectionError::EmitNotAllowed);
        }

        let mut emissions = if outcome.processed {
            outcome.emitted
        } else {
            Vec::new()
        };

        if outcome.processed
            && let Some(new_state) = outcome.new_state
            && new_state != state
        {
            let (at, lock_owner) = if partition == ROOT_PARTITION {
                (None, None)
            } else {
                (Some(event.tag), Some(owner))
            };
            self.cache
                .cache_and_lock(&partition, new_state.clone(), at, lock_owner)?;

            if self.config.publish_state_updates {
                emissions.push(EmittedEvent {
                    stream: self.source.partition_state_stream(&partition),
                    event_id: Uuid::new_v4(),
                    event_type: STATE_UPDATED_EVENT_TYPE.to_string(),
                    data: new_state,
                    metadata: Some(event.tag.to_json()),
                });
            }
        }

        self.finalize_event_processing(emissions, event.tag, self.last_progress);
        Ok(())
    }

    fn handler_failure(&self, position: CheckpointTag, message: String) -> ProjectionError {
        ProjectionError::Handler {
            projection: self.config.name.clone(),
            handler: self.handler.description().to_string(),
            position,
            message,
        }
    }

    /// Hand one work item's results to the checkpoint manager.
    ///
    /// Once faulted, nothing more reaches the manager for any tag.
    fn finalize_event_processing(
        &mut self,
        emissions: Vec<EmittedEvent>,
        tag: CheckpointTag,
        progress: f32,
    ) {
        if matches!(
            self.phase,
            ProjectionPhase::FaultedStopping | ProjectionPhase::Faulted
        ) {
            return;
        }
        let current_state = self.cache.peek(ROOT_PARTITION).map(str::to_string);
        self.checkpoints
            .event_processed(current_state.as_deref(), emissions, tag, progress);
    }

    // === Partition state recovery ===

    /// Issue a backward read of the partition's state stream; the work
    /// item parks until the reply arrives.
    fn begin_partition_load(&mut self, partition: String, event: CommittedEvent, owner: u64) {
        let correlation_id = Uuid::new_v4();
        let stream = self.source.partition_state_stream(&partition);
        tracing::debug!(
            "[{}] recovering state of partition '{}' from {}",
            self.config.name,
            partition,
            stream
        );

        self.reader
            .read_backward(correlation_id, &stream, None, STATE_READ_BATCH);
        self.load_state_requests.insert(
            correlation_id,
            PendingStateLoad {
                partition,
                owner,
                event,
                stream,
            },
        );
    }

    /// Walk the state stream backward, page by page, for the most
    /// recent `StateUpdated` written strictly before the parked item's
    /// tag. An exhausted stream means the partition starts empty.
    fn state_read_completed(&mut self, page: BackwardReadCompleted) -> Result<()> {
        let Some(pending) = self.load_state_requests.remove(&page.correlation_id) else {
            // Reply to a canceled or unknown request: a restart already
            // tore its context down
            return Ok(());
        };

        for recorded in &page.events {
            if recorded.event_type != STATE_UPDATED_EVENT_TYPE {
                continue;
            }
            let metadata = recorded.metadata.as_deref().unwrap_or("");
            let tag = parse_tag(metadata.as_bytes())
                .map_err(|e| ProjectionError::StateLoad(e.to_string()))?
                .ok_or_else(|| {
                    ProjectionError::StateLoad(format!(
                        "state event in {} carries no checkpoint tag",
                        pending.stream
                    ))
                })?;

            if tag < pending.event.tag {
                return self.complete_partition_load(pending, recorded.data.clone());
            }
        }

        if page.is_end_of_stream {
            // Nothing usable on the stream: the partition starts empty
            return self.complete_partition_load(pending, String::new());
        }

        // Keep walking backward
        let correlation_id = Uuid::new_v4();
        self.reader.read_backward(
            correlation_id,
            &pending.stream,
            page.next_event_number,
            STATE_READ_BATCH,
        );
        self.load_state_requests.insert(correlation_id, pending);
        Ok(())
    }

    fn complete_partition_load(&mut self, pending: PendingStateLoad, state: String) -> Result<()> {
        let PendingStateLoad {
            partition,
            owner,
            event,
            ..
        } = pending;

        self.cache
            .cache_and_lock(&partition, state.clone(), Some(event.tag), Some(owner))?;
        self.process_committed(event, partition, owner, state)?;

        // The queue was parked behind this item; pick it back up
        self.ensure_tick();
        Ok(())
    }
}
