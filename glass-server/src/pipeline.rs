//! Pipeline lifecycle: Created -> Running -> Stopping -> Stopped
//!
//! The writer gets its own OS thread with its own single-threaded runtime, so
//! a slow disk or a panicking writer cannot stall the executor that serves
//! DHCP requests. The thread is detached and never holds up process exit.

use glass_core::{GlassConfig, GlassError, TransactionBundle};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::subsystems::channel::{event_channel, EventSender, Stage};
use crate::subsystems::writer::{run_writer, WriterSettings};

const WRITER_THREAD_NAME: &str = "looking-glass-writer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// How a call to [`Pipeline::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The writer drained the queue and exited.
    Clean,
    /// The writer thread ended without signalling completion.
    Abnormal,
    /// Sentinel queued, writer still busy at the deadline.
    TimedOut,
    /// Queue stayed full until the deadline; the writer was never told to stop.
    NotSignalled,
    /// Nothing to do: the pipeline was not running.
    NotRunning,
}

pub struct Pipeline {
    events: EventSender,
    state: PipelineState,
    done: Option<oneshot::Receiver<()>>,
    worker: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Build the channel and start the writer immediately.
    pub fn start(config: &GlassConfig) -> Result<Self, GlassError> {
        let settings = WriterSettings::from_config(config)?;
        let (events, receiver) = event_channel(config.pipeline.queue_capacity);
        let (done_tx, done_rx) = oneshot::channel();

        let mut pipeline = Self {
            events,
            state: PipelineState::Created,
            done: Some(done_rx),
            worker: None,
            shutdown_timeout: Duration::from_secs(config.pipeline.shutdown_timeout_secs),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name(WRITER_THREAD_NAME)
            .build()?;
        let store_path = config.store.path.clone();

        let worker = std::thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(run_writer(receiver, store_path, settings));
                let _ = done_tx.send(());
            })?;

        pipeline.worker = Some(worker);
        pipeline.state = PipelineState::Running;
        tracing::debug!(
            capacity = config.pipeline.queue_capacity,
            "Looking glass pipeline running"
        );
        Ok(pipeline)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Producer handle, for call sites that outlive a borrow of the pipeline.
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn enqueue(&self, stage: Stage, bundle: TransactionBundle) -> bool {
        self.events.enqueue(stage, bundle)
    }

    /// Send the sentinel and wait (bounded) for the writer to drain and exit.
    ///
    /// A writer that does not finish in time is reported, not killed. Calling
    /// this more than once is a no-op.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        if self.state != PipelineState::Running {
            tracing::debug!(state = ?self.state, "Looking glass pipeline already stopping");
            return ShutdownOutcome::NotRunning;
        }
        self.state = PipelineState::Stopping;

        let events = &self.events;
        let done = self.done.take();
        let mut sentinel_queued = false;
        let finished = tokio::time::timeout(self.shutdown_timeout, async {
            if events.send_shutdown().await {
                sentinel_queued = true;
            } else {
                tracing::debug!("Looking glass writer already gone");
            }
            match done {
                Some(done) => done.await.is_ok(),
                None => true,
            }
        })
        .await;

        let outcome = match finished {
            Ok(true) => {
                // The writer has signalled; the thread only has its runtime left to drop.
                self.worker.take();
                tracing::debug!("Looking glass pipeline stopped");
                ShutdownOutcome::Clean
            }
            Ok(false) => {
                self.worker.take();
                tracing::error!("Looking glass database writer exited abnormally");
                ShutdownOutcome::Abnormal
            }
            Err(_) if !sentinel_queued => {
                tracing::error!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    capacity = events.max_capacity(),
                    "Looking glass queue stayed full, shutdown signal was not delivered to the writer"
                );
                ShutdownOutcome::NotSignalled
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Looking glass database writer has not shut down, thread may be hanging"
                );
                ShutdownOutcome::TimedOut
            }
        };
        self.state = PipelineState::Stopped;
        outcome
    }

    /// Whether the writer thread is still alive.
    pub fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            // No waiting here: best effort only.
            if !self.events.try_send_shutdown() {
                tracing::warn!("Looking glass pipeline dropped while queue full; writer stops once producers are gone");
            }
            self.state = PipelineState::Stopped;
        }
    }
}
