//! Common test utilities for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use projection_runtime::{
    BackwardReadCompleted, CheckpointManager, CheckpointTag, CommittedEvent, EmittedEvent,
    EventEnvelope, HandlerError, HandlerOutcome, OutputBus, ProjectionConfig, ProjectionHandler,
    ProjectionMessage, ProjectionMode, ProjectionOutput, ProjectionRuntime, RecordedEvent,
    StreamReader,
};
use uuid::Uuid;

/// One call the runtime made on its checkpoint manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerCall {
    Initialize,
    Start(CheckpointTag),
    BeginLoadState,
    EventProcessed {
        state: Option<String>,
        emissions: Vec<EmittedEvent>,
        tag: CheckpointTag,
        progress: f32,
    },
    RequestCheckpointToStop,
    Stopping,
    Stopped,
}

/// Checkpoint manager that records every call for later inspection.
pub struct RecordingCheckpointManager {
    calls: Arc<Mutex<Vec<ManagerCall>>>,
}

impl RecordingCheckpointManager {
    pub fn new(calls: Arc<Mutex<Vec<ManagerCall>>>) -> Self {
        Self { calls }
    }

    fn record(&self, call: ManagerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl CheckpointManager for RecordingCheckpointManager {
    fn initialize(&mut self) {
        self.record(ManagerCall::Initialize);
    }

    fn start(&mut self, from_tag: CheckpointTag) {
        self.record(ManagerCall::Start(from_tag));
    }

    fn begin_load_state(&mut self) {
        self.record(ManagerCall::BeginLoadState);
    }

    fn event_processed(
        &mut self,
        current_state: Option<&str>,
        emissions: Vec<EmittedEvent>,
        tag: CheckpointTag,
        progress: f32,
    ) {
        self.record(ManagerCall::EventProcessed {
            state: current_state.map(str::to_string),
            emissions,
            tag,
            progress,
        });
    }

    fn request_checkpoint_to_stop(&mut self) {
        self.record(ManagerCall::RequestCheckpointToStop);
    }

    fn stopping(&mut self) {
        self.record(ManagerCall::Stopping);
    }

    fn stopped(&mut self) {
        self.record(ManagerCall::Stopped);
    }
}

/// A backward read request issued by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub correlation_id: Uuid,
    pub stream: String,
    pub from_event_number: Option<u64>,
    pub max_count: usize,
}

/// Reader that records requests; tests answer them by feeding
/// `ReadStreamEventsBackwardCompleted` messages back in.
pub struct ScriptedReader {
    requests: Arc<Mutex<Vec<ReadRequest>>>,
    cancels: Arc<Mutex<Vec<Uuid>>>,
}

impl ScriptedReader {
    pub fn new(requests: Arc<Mutex<Vec<ReadRequest>>>, cancels: Arc<Mutex<Vec<Uuid>>>) -> Self {
        Self { requests, cancels }
    }
}

impl StreamReader for ScriptedReader {
    fn read_backward(
        &mut self,
        correlation_id: Uuid,
        stream: &str,
        from_event_number: Option<u64>,
        max_count: usize,
    ) {
        self.requests.lock().unwrap().push(ReadRequest {
            correlation_id,
            stream: stream.to_string(),
            from_event_number,
            max_count,
        });
    }

    fn cancel(&mut self, correlation_id: Uuid) {
        self.cancels.lock().unwrap().push(correlation_id);
    }
}

/// Bus that captures every published output.
pub struct CapturingBus {
    outputs: Arc<Mutex<Vec<ProjectionOutput>>>,
}

impl CapturingBus {
    pub fn new(outputs: Arc<Mutex<Vec<ProjectionOutput>>>) -> Self {
        Self { outputs }
    }
}

impl OutputBus for CapturingBus {
    fn publish(&mut self, output: ProjectionOutput) {
        self.outputs.lock().unwrap().push(output);
    }
}

/// Handler driven by a script of outcomes.
///
/// Each `process_event` call pops the next scripted outcome; an empty
/// script yields `processed = true` with no state change. Loads and
/// processed events are recorded for assertions.
pub struct ScriptedHandler {
    outcomes: Arc<Mutex<VecDeque<Result<HandlerOutcome, HandlerError>>>>,
    /// `None` = `initialize()`, `Some(state)` = `load(state)`
    loads: Arc<Mutex<Vec<Option<String>>>>,
    /// (stream_id, commit position) of every processed event
    seen: Arc<Mutex<Vec<(String, u64)>>>,
}

impl ScriptedHandler {
    pub fn new(
        outcomes: Arc<Mutex<VecDeque<Result<HandlerOutcome, HandlerError>>>>,
        loads: Arc<Mutex<Vec<Option<String>>>>,
        seen: Arc<Mutex<Vec<(String, u64)>>>,
    ) -> Self {
        Self {
            outcomes,
            loads,
            seen,
        }
    }
}

impl ProjectionHandler for ScriptedHandler {
    fn initialize(&mut self) -> Result<(), HandlerError> {
        self.loads.lock().unwrap().push(None);
        Ok(())
    }

    fn load(&mut self, state: &str) -> Result<(), HandlerError> {
        self.loads.lock().unwrap().push(Some(state.to_string()));
        Ok(())
    }

    fn process_event(&mut self, event: &EventEnvelope<'_>) -> Result<HandlerOutcome, HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push((event.stream_id.to_string(), event.tag.commit_position));

        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(HandlerOutcome {
                processed: true,
                new_state: None,
                emitted: Vec::new(),
            }),
        }
    }

    fn description(&self) -> &str {
        "scripted-handler"
    }
}

/// A projection runtime wired to recording collaborators, plus the
/// shared handles to inspect them.
pub struct TestProjection {
    pub runtime:
        ProjectionRuntime<ScriptedHandler, RecordingCheckpointManager, ScriptedReader, CapturingBus>,
    pub outcomes: Arc<Mutex<VecDeque<Result<HandlerOutcome, HandlerError>>>>,
    pub loads: Arc<Mutex<Vec<Option<String>>>>,
    pub seen: Arc<Mutex<Vec<(String, u64)>>>,
    pub calls: Arc<Mutex<Vec<ManagerCall>>>,
    pub outputs: Arc<Mutex<Vec<ProjectionOutput>>>,
    pub reads: Arc<Mutex<Vec<ReadRequest>>>,
    pub cancels: Arc<Mutex<Vec<Uuid>>>,
    next_sequence: u64,
}

impl TestProjection {
    pub fn new(config: ProjectionConfig) -> Self {
        let outcomes = Arc::new(Mutex::new(VecDeque::new()));
        let loads = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let reads = Arc::new(Mutex::new(Vec::new()));
        let cancels = Arc::new(Mutex::new(Vec::new()));

        let runtime = ProjectionRuntime::new(
            config,
            ScriptedHandler::new(outcomes.clone(), loads.clone(), seen.clone()),
            RecordingCheckpointManager::new(calls.clone()),
            ScriptedReader::new(reads.clone(), cancels.clone()),
            CapturingBus::new(outputs.clone()),
        );

        Self {
            runtime,
            outcomes,
            loads,
            seen,
            calls,
            outputs,
            reads,
            cancels,
            next_sequence: 0,
        }
    }

    pub fn config(name: &str, mode: ProjectionMode) -> ProjectionConfig {
        ProjectionConfig::new(name, mode)
    }

    /// Feed a message and then consume any ticks the runtime armed.
    pub fn handle(&mut self, message: ProjectionMessage) {
        self.runtime.handle(message);
        self.pump();
    }

    /// Route published ticks back into the runtime until quiescent.
    pub fn pump(&mut self) {
        loop {
            let ticks = {
                let mut outputs = self.outputs.lock().unwrap();
                let before = outputs.len();
                outputs.retain(|output| *output != ProjectionOutput::Tick);
                before - outputs.len()
            };
            if ticks == 0 {
                break;
            }
            for _ in 0..ticks {
                self.runtime.handle(ProjectionMessage::Tick);
            }
        }
    }

    /// Start the projection with no prior checkpoint.
    pub fn start_running(&mut self) {
        self.handle(ProjectionMessage::Start);
        self.handle(ProjectionMessage::CheckpointLoaded {
            tag: None,
            state: None,
        });
    }

    /// Queue the next scripted handler outcome.
    pub fn script(&mut self, outcome: Result<HandlerOutcome, HandlerError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// The next subscription sequence number, consumed.
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Deliver a committed event at `commit` with the next sequence.
    pub fn deliver(&mut self, stream_id: &str, event_type: &str, data: &str, commit: u64) {
        let sequence = self.next_sequence();
        self.deliver_with_sequence(sequence, stream_id, event_type, data, commit);
    }

    /// Deliver a committed event with an explicit sequence number.
    pub fn deliver_with_sequence(
        &mut self,
        sequence: u64,
        stream_id: &str,
        event_type: &str,
        data: &str,
        commit: u64,
    ) {
        self.handle(ProjectionMessage::CommittedEventReceived {
            sequence,
            event: committed_event(stream_id, event_type, data, commit),
        });
    }

    /// Snapshot of published outputs (ticks already pumped away).
    pub fn outputs(&self) -> Vec<ProjectionOutput> {
        self.outputs.lock().unwrap().clone()
    }

    /// Snapshot of checkpoint manager calls.
    pub fn manager_calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Tags of every `event_processed` call, in order.
    pub fn processed_tags(&self) -> Vec<CheckpointTag> {
        self.manager_calls()
            .into_iter()
            .filter_map(|call| match call {
                ManagerCall::EventProcessed { tag, .. } => Some(tag),
                _ => None,
            })
            .collect()
    }

    /// Emissions handed to the manager, flattened in order.
    pub fn scheduled_emissions(&self) -> Vec<EmittedEvent> {
        self.manager_calls()
            .into_iter()
            .filter_map(|call| match call {
                ManagerCall::EventProcessed { emissions, .. } => Some(emissions),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Tag with distinct commit/prepare positions, as on a real feed.
pub fn tag(commit: u64) -> CheckpointTag {
    CheckpointTag::new(commit, commit.saturating_sub(1))
}

pub fn committed_event(
    stream_id: &str,
    event_type: &str,
    data: &str,
    commit: u64,
) -> CommittedEvent {
    CommittedEvent {
        tag: tag(commit),
        stream_id: stream_id.to_string(),
        event_type: event_type.to_string(),
        event_id: Uuid::new_v4(),
        sequence_number: 0,
        metadata: None,
        data: data.to_string(),
    }
}

/// Outcome that replaces the partition state.
pub fn state_change(new_state: &str) -> Result<HandlerOutcome, HandlerError> {
    Ok(HandlerOutcome {
        processed: true,
        new_state: Some(new_state.to_string()),
        emitted: Vec::new(),
    })
}

/// Outcome that emits one derived event.
pub fn emission(stream: &str, event_type: &str, data: &str) -> Result<HandlerOutcome, HandlerError> {
    Ok(HandlerOutcome {
        processed: true,
        new_state: None,
        emitted: vec![EmittedEvent {
            stream: stream.to_string(),
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            data: data.to_string(),
            metadata: None,
        }],
    })
}

/// A `StateUpdated` event as read back from a state stream.
pub fn state_updated(event_number: u64, state: &str, at: CheckpointTag) -> RecordedEvent {
    RecordedEvent {
        event_number,
        event_type: "StateUpdated".to_string(),
        data: state.to_string(),
        metadata: Some(at.to_json()),
    }
}

/// Reply to the most recent outstanding read request.
pub fn read_reply(
    request: &ReadRequest,
    events: Vec<RecordedEvent>,
    next_event_number: Option<u64>,
    is_end_of_stream: bool,
) -> ProjectionMessage {
    ProjectionMessage::ReadStreamEventsBackwardCompleted(BackwardReadCompleted {
        correlation_id: request.correlation_id,
        events,
        next_event_number,
        is_end_of_stream,
    })
}
