//! The cooperative polling loop that drives queue processing.
//!
//! One manager owns one timer. Every tick delegates to the processor unless
//! a previous tick is still in flight (overlap guard) or the store's
//! liveness probe says the table is not ready. Stopping is cooperative: it
//! cancels future ticks, then waits a bounded time for the in-flight tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::QueueError;
use crate::queue::processor::Processor;
use crate::state::SharedState;

/// How often the stop path re-checks the in-flight flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// How many checks before stop gives up and reports a timeout.
const SHUTDOWN_CHECKS: u32 = 20;

pub struct QueueManager {
    state: SharedState,
    processor: Arc<Processor>,
    is_processing: Arc<AtomicBool>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl QueueManager {
    pub fn new(state: SharedState) -> Self {
        let processor = Arc::new(Processor::new(Arc::clone(&state)));
        Self {
            state,
            processor,
            is_processing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
        }
    }

    /// Begins ticking at the configured interval. A no-op when already
    /// running.
    pub fn start(&mut self) {
        if self.stop_tx.is_some() {
            return;
        }
        tracing::info!("Processing queue");

        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);

        let state = Arc::clone(&self.state);
        let processor = Arc::clone(&self.processor);
        let is_processing = Arc::clone(&self.is_processing);
        let interval = Duration::from_millis(self.state.config.poll_interval_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Ticks are independent tasks so a slow batch cannot
                        // stall the timer; the overlap guard keeps at most
                        // one batch in flight.
                        let state = Arc::clone(&state);
                        let processor = Arc::clone(&processor);
                        let is_processing = Arc::clone(&is_processing);
                        tokio::spawn(async move {
                            run_tick(&state, &processor, &is_processing).await;
                        });
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });
    }

    /// Whether ticking is scheduled. Does not say whether a tick is
    /// executing right now.
    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Runs a single tick immediately, subject to the same overlap guard as
    /// scheduled ticks.
    pub async fn tick(&self) {
        run_tick(&self.state, &self.processor, &self.is_processing).await;
    }

    /// Cancels future ticks and waits for any in-flight tick to finish.
    /// A no-op when already stopped.
    pub async fn stop(&mut self) -> Result<(), QueueError> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };
        tracing::info!("Stopping queue, please wait...");
        let _ = stop_tx.send(true);

        if !self.is_processing.load(Ordering::SeqCst) {
            tracing::info!("Safe to terminate process");
            return Ok(());
        }
        for _ in 0..SHUTDOWN_CHECKS {
            tokio::time::sleep(SHUTDOWN_POLL).await;
            if !self.is_processing.load(Ordering::SeqCst) {
                tracing::info!("Safe to terminate process");
                return Ok(());
            }
        }
        Err(QueueError::ShutdownTimeout)
    }
}

async fn run_tick(state: &SharedState, processor: &Processor, is_processing: &AtomicBool) {
    if is_processing.swap(true, Ordering::SeqCst) {
        tracing::debug!("Skipping tick due to processing overlap");
        return;
    }

    match state.store.table_is_active().await {
        Ok(true) => {
            // A failed batch must never take the scheduler down.
            if let Err(e) = processor.process().await {
                tracing::error!("Error processing queue: {e}");
            }
        }
        Ok(false) => tracing::info!("Skipping tick due to inactive table"),
        Err(e) => tracing::warn!("Skipping tick, table status check failed: {e}"),
    }

    is_processing.store(false, Ordering::SeqCst);
}
