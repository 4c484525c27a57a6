//! Async shell driving a projection runtime from a message channel.
//!
//! The runtime itself is synchronous and single-threaded; the worker
//! provides the one logical thread it runs on, feeding it messages
//! until shutdown. Self-scheduled ticks loop back through the same
//! channel so they interleave with external inputs in arrival order.

use tokio::sync::{mpsc, oneshot};

use crate::bus::{OutputBus, ProjectionMessage, ProjectionOutput};
use crate::checkpoint::CheckpointManager;
use crate::handler::ProjectionHandler;
use crate::reader::StreamReader;
use crate::runtime::ProjectionRuntime;

/// Output bus backed by channels: ticks are routed back into the
/// runtime's input feed, everything else goes to the outside world.
pub struct ChannelBus {
    outputs: mpsc::UnboundedSender<ProjectionOutput>,
    loopback: mpsc::UnboundedSender<ProjectionMessage>,
}

impl ChannelBus {
    pub fn new(
        outputs: mpsc::UnboundedSender<ProjectionOutput>,
        loopback: mpsc::UnboundedSender<ProjectionMessage>,
    ) -> Self {
        Self { outputs, loopback }
    }
}

impl OutputBus for ChannelBus {
    fn publish(&mut self, output: ProjectionOutput) {
        match output {
            ProjectionOutput::Tick => {
                // Receiver dropped means the worker is shutting down
                let _ = self.loopback.send(ProjectionMessage::Tick);
            }
            other => {
                let _ = self.outputs.send(other);
            }
        }
    }
}

/// Owns a projection runtime and pumps its input channel.
pub struct ProjectionWorker<H, C, R>
where
    H: ProjectionHandler,
    C: CheckpointManager,
    R: StreamReader,
{
    runtime: ProjectionRuntime<H, C, R, ChannelBus>,
    input: mpsc::UnboundedReceiver<ProjectionMessage>,
    name: String,
}

impl<H, C, R> ProjectionWorker<H, C, R>
where
    H: ProjectionHandler,
    C: CheckpointManager,
    R: StreamReader,
{
    pub fn new(
        name: impl Into<String>,
        runtime: ProjectionRuntime<H, C, R, ChannelBus>,
        input: mpsc::UnboundedReceiver<ProjectionMessage>,
    ) -> Self {
        Self {
            runtime,
            input,
            name: name.into(),
        }
    }

    /// Run until shutdown is signaled or the input channel closes.
    ///
    /// Returns the runtime so callers can inspect its final phase.
    pub async fn run(
        mut self,
        mut shutdown: oneshot::Receiver<()>,
    ) -> ProjectionRuntime<H, C, R, ChannelBus> {
        tracing::info!("[{}] projection worker started", self.name);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("[{}] shutdown signal received", self.name);
                    break;
                }

                message = self.input.recv() => {
                    match message {
                        Some(message) => self.runtime.handle(message),
                        None => {
                            tracing::warn!("[{}] input channel closed", self.name);
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("[{}] projection worker stopped", self.name);
        self.runtime
    }
}
