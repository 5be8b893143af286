//! The work-process state machine.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

use super::config::{DelayRange, ProcessConfig};
use super::inspector::{EggInspector, RandomInspector};
use super::ProcessSnapshot;
use crate::data::{Batch, BatchStats, ComponentRegistry, EggResult, ProcessState};
use crate::error::ProcessError;
use crate::event_bus::{Event, EventSink};

/// Why a run stopped before completing
enum Halt {
    /// Superseded by stop or reset; exit silently
    Stopped,
    /// Fault inside a phase
    Fault(ProcessError),
}

impl From<ProcessError> for Halt {
    fn from(err: ProcessError) -> Self {
        Halt::Fault(err)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ProcessState,
    is_processing: bool,
    batch: Option<Batch>,
    stats: BatchStats,
    target: u32,
    /// Bumped by start, stop and reset; a run only acts while it matches.
    generation: u64,
    run: Option<AbortHandle>,
}

impl Inner {
    fn can_start(&self, components: &ComponentRegistry) -> bool {
        self.state == ProcessState::Idle && !self.is_processing && components.all_ready()
    }

    fn owns(&self, generation: u64) -> bool {
        self.generation == generation && self.is_processing
    }
}

/// Drives a batch through the processing phases
///
/// Cloning yields another handle to the same machine. Exactly one batch can
/// be active at a time.
#[derive(Clone)]
pub struct WorkProcess {
    inner: Arc<Mutex<Inner>>,
    config: Arc<ProcessConfig>,
    components: ComponentRegistry,
    inspector: Arc<Mutex<Box<dyn EggInspector>>>,
    events: EventSink,
}

impl WorkProcess {
    /// Create a machine reading readiness from `components` and emitting into `events`
    pub fn new(config: ProcessConfig, components: ComponentRegistry, events: EventSink) -> Self {
        let inspector = RandomInspector::new(config.success_rate);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            config: Arc::new(config),
            components,
            inspector: Arc::new(Mutex::new(Box::new(inspector))),
            events,
        }
    }

    /// Replace the egg inspector
    pub fn with_inspector(self, inspector: impl EggInspector + 'static) -> Self {
        *self.inspector.lock() = Box::new(inspector);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Current phase
    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    /// Whether a run is active
    pub fn is_processing(&self) -> bool {
        self.inner.lock().is_processing
    }

    /// Statistics of the current or last batch
    pub fn stats(&self) -> BatchStats {
        self.inner.lock().stats
    }

    /// Whether a batch could be started right now
    pub fn can_start(&self) -> bool {
        self.inner.lock().can_start(&self.components)
    }

    /// Start a batch and run its phases in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_batch(&self, batch_id: String, egg_count: u32) -> Result<Batch, ProcessError> {
        let (batch, generation) = {
            let mut inner = self.inner.lock();
            if !inner.can_start(&self.components) {
                tracing::warn!(
                    "Refusing to start batch {} in state {} (processing: {})",
                    batch_id,
                    inner.state,
                    inner.is_processing
                );
                return Err(ProcessError::CannotStart);
            }

            let batch = Batch::new(batch_id, egg_count);
            inner.generation += 1;
            inner.state = ProcessState::GettingReady;
            inner.is_processing = true;
            inner.stats = BatchStats::default();
            inner.target = egg_count;
            inner.batch = Some(batch.clone());
            (batch, inner.generation)
        };

        tracing::info!("Started batch {} with {} eggs", batch.id, egg_count);

        let machine = self.clone();
        let run = tokio::spawn(async move { machine.run(generation).await });
        self.inner.lock().run = Some(run.abort_handle());

        // A panic inside the run is converted into the error state.
        let machine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = run.await {
                if e.is_panic() {
                    machine.fault(
                        generation,
                        ProcessError::Fault {
                            reason: "processing task panicked".to_string(),
                        },
                    );
                }
            }
        });

        Ok(batch)
    }

    /// Stop the active run and return to `idle`
    ///
    /// Returns the statistics accumulated so far.
    pub fn stop(&self) -> Result<BatchStats, ProcessError> {
        let stats = {
            let mut inner = self.inner.lock();
            if !inner.is_processing {
                return Err(ProcessError::NotProcessing);
            }
            inner.generation += 1;
            inner.is_processing = false;
            inner.state = ProcessState::Idle;
            if let Some(run) = inner.run.take() {
                run.abort();
            }
            inner.stats
        };

        tracing::info!(
            "Processing stopped after {} egg(s)",
            stats.total_processed
        );
        self.events.emit(Event::ProcessUpdate {
            status: ProcessState::Idle,
            message: "Processing stopped".to_string(),
            stats: Some(stats),
            batch: None,
            timestamp: Utc::now(),
        });
        Ok(stats)
    }

    /// Clear the batch and statistics and return to `idle`
    ///
    /// Only accepted from `idle`, `completed` or `error`.
    pub fn reset(&self) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        if inner.is_processing || !inner.state.is_resettable() {
            return Err(ProcessError::ResetWhileRunning {
                state: inner.state.to_string(),
            });
        }
        let generation = inner.generation + 1;
        *inner = Inner {
            generation,
            ..Inner::default()
        };
        tracing::info!("Work process reset to idle");
        Ok(())
    }

    /// Snapshot of the machine for status replies
    pub fn snapshot(&self) -> ProcessSnapshot {
        let inner = self.inner.lock();
        ProcessSnapshot {
            status: inner.state,
            is_processing: inner.is_processing,
            current_batch: inner.batch.clone(),
            stats: inner.stats,
            component_status: self.components.readiness(),
            can_start: inner.can_start(&self.components),
            timestamp: Utc::now(),
        }
    }

    async fn run(self, generation: u64) {
        match self.run_phases(generation).await {
            Ok(()) => {}
            Err(Halt::Stopped) => {
                tracing::debug!("Run {} superseded", generation);
            }
            Err(Halt::Fault(err)) => self.fault(generation, err),
        }
    }

    async fn run_phases(&self, generation: u64) -> Result<(), Halt> {
        self.enter_phase(
            generation,
            ProcessState::GettingReady,
            "System getting ready for processing...".to_string(),
        )?;
        self.wait(generation, &self.config.getting_ready_delay).await?;

        let target = self.inner.lock().target;
        self.enter_phase(
            generation,
            ProcessState::LoadEggs,
            format!("Loading {} eggs into processing system...", target),
        )?;
        self.wait(generation, &self.config.load_eggs_delay).await?;

        self.enter_phase(
            generation,
            ProcessState::ReadyToProcess,
            "System ready to process eggs. Starting processing...".to_string(),
        )?;
        self.wait(generation, &self.config.ready_to_process_delay)
            .await?;

        self.enter_phase(
            generation,
            ProcessState::Processing,
            "Processing eggs...".to_string(),
        )?;
        for egg_number in 1..=target {
            self.process_egg(generation, egg_number, target).await?;
        }

        self.complete(generation)
    }

    fn enter_phase(
        &self,
        generation: u64,
        state: ProcessState,
        message: String,
    ) -> Result<(), Halt> {
        {
            let mut inner = self.inner.lock();
            if !inner.owns(generation) {
                return Err(Halt::Stopped);
            }
            inner.state = state;
        }
        tracing::info!("Work process entered {}", state);
        self.events.emit(Event::ProcessUpdate {
            status: state,
            message,
            stats: None,
            batch: None,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn wait(&self, generation: u64, range: &DelayRange) -> Result<(), Halt> {
        let delay = range.sample(&mut rand::rng());
        self.sleep_checked(generation, delay).await
    }

    async fn sleep_checked(&self, generation: u64, delay: Duration) -> Result<(), Halt> {
        tokio::time::sleep(delay).await;
        if self.inner.lock().owns(generation) {
            Ok(())
        } else {
            Err(Halt::Stopped)
        }
    }

    async fn process_egg(&self, generation: u64, egg_number: u32, target: u32) -> Result<(), Halt> {
        self.sleep_checked(generation, self.config.egg_interval())
            .await?;

        let (quality, size) = self.inspector.lock().inspect(egg_number)?;

        let stats = {
            let mut inner = self.inner.lock();
            if !inner.owns(generation) {
                return Err(Halt::Stopped);
            }
            inner.stats.record(quality, size);
            inner.stats
        };

        self.events.emit(Event::EggResult {
            egg_number,
            result: EggResult {
                quality,
                size,
                timestamp: Utc::now(),
            },
        });

        if egg_number % self.config.progress_interval == 0 || egg_number == target {
            self.events.emit(Event::ProcessProgress {
                current: egg_number,
                total: target,
                stats,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    fn complete(&self, generation: u64) -> Result<(), Halt> {
        let (stats, batch) = {
            let mut inner = self.inner.lock();
            if !inner.owns(generation) {
                return Err(Halt::Stopped);
            }
            let stats = inner.stats;
            inner.state = ProcessState::Completed;
            inner.is_processing = false;
            inner.run = None;
            if let Some(batch) = inner.batch.as_mut() {
                batch.complete(stats);
            }
            (stats, inner.batch.clone())
        };

        tracing::info!(
            "Work process completed: {} good, {} bad",
            stats.good_eggs,
            stats.bad_eggs
        );
        self.events.emit(Event::ProcessUpdate {
            status: ProcessState::Completed,
            message: "Processing completed successfully!".to_string(),
            stats: Some(stats),
            batch,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn fault(&self, generation: u64, err: ProcessError) {
        let stats = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.state = ProcessState::Error;
            inner.is_processing = false;
            inner.run = None;
            inner.stats
        };

        tracing::error!("Error in work process: {}", err);
        self.events.emit(Event::ProcessUpdate {
            status: ProcessState::Error,
            message: err.to_string(),
            stats: Some(stats),
            batch: None,
            timestamp: Utc::now(),
        });
    }
}

impl std::fmt::Debug for WorkProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("WorkProcess")
            .field("state", &inner.state)
            .field("is_processing", &inner.is_processing)
            .field("target", &inner.target)
            .finish()
    }
}
