//! Swap-chain processor
//!
//! Each assigned swap-chain gets one processor: a dedicated worker thread
//! that loops acquire → process → release until it is stopped or the
//! swap-chain is revoked, plus an optional forwarder thread that feeds a
//! [`FrameSink`] through a bounded queue.
//!
//! ```text
//!  compositor ──acquire──▶ worker ──release──▶ compositor
//!                            │
//!                     try_send (drop if full)
//!                            ▼
//!                        forwarder ──accept──▶ FrameSink
//! ```
//!
//! The worker never touches monitor or adapter state. Stopping is
//! cooperative: signal, then join the worker, then join the forwarder.

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::ProcessorConfig;
use crate::error::{Result, ViddError};
use crate::metrics::{ProcessorMetrics, ProcessorStats};
use crate::sink::FrameSink;
use crate::swapchain::{Acquire, RevokeReason, StopHandle, StopToken, SwapChain, stop_pair};
use crate::types::{AcquiredFrame, Handle};

/// Why the frame loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExitReason {
    /// Stop was requested
    Stopped,
    /// The swap-chain stopped delivering frames
    Revoked(RevokeReason),
    /// The swap-chain rejected a release; it cannot be used further
    Failed(String),
    /// The worker thread panicked
    Panicked,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Revoked(reason) => write!(f, "revoked ({})", reason),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// Final account of a processor, produced once it has fully stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorReport {
    /// Processor identity
    pub processor: Handle,
    /// Swap-chain it consumed
    pub swap_chain: Handle,
    /// Why the loop ended
    pub exit: ExitReason,
    /// Final counters
    pub stats: ProcessorStats,
}

/// Owns the worker (and forwarder) thread of one swap-chain
pub struct SwapChainProcessor {
    handle: Handle,
    swap_chain: Handle,
    stop: StopHandle,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<ExitReason>>,
    forwarder: Option<JoinHandle<()>>,
    metrics: Arc<ProcessorMetrics>,
    exit: Option<ExitReason>,
}

impl SwapChainProcessor {
    /// Spawn the worker thread for `swap_chain`
    ///
    /// Fails with [`ViddError::Resource`] if a thread cannot be created; no
    /// thread is left running in that case.
    pub fn start(
        swap_chain: Box<dyn SwapChain>,
        sink: Option<Arc<dyn FrameSink>>,
        config: &ProcessorConfig,
    ) -> Result<Self> {
        let handle = Handle::new();
        let swap_chain_handle = swap_chain.handle();
        let metrics = Arc::new(ProcessorMetrics::new());
        let (stop, token) = stop_pair();

        let (forward_tx, forwarder) = match sink {
            Some(sink) if config.forward_queue_depth > 0 => {
                let (tx, rx) = crossbeam_channel::bounded::<AcquiredFrame>(config.forward_queue_depth);
                let metrics = metrics.clone();
                let thread = std::thread::Builder::new()
                    .name(format!("vidd-forward-{}", handle.as_u64()))
                    .spawn(move || {
                        debug!("Forwarding frames to {} sink", sink.name());
                        for frame in rx.iter() {
                            let present_id = frame.present_id();
                            if let Err(e) = sink.accept(frame) {
                                let failures = metrics.record_sink_failure();
                                if failures == 1 || failures % 100 == 0 {
                                    warn!(
                                        "Sink {} rejected frame {}: {} ({} failures)",
                                        sink.name(),
                                        present_id,
                                        e,
                                        failures
                                    );
                                }
                            }
                        }
                        if let Err(e) = sink.flush() {
                            warn!("Failed to flush {} sink: {}", sink.name(), e);
                        }
                    })
                    .map_err(|e| {
                        ViddError::resource(format!("Failed to spawn forwarder thread: {}", e))
                    })?;
                (Some(tx), Some(thread))
            }
            _ => (None, None),
        };

        let running = Arc::new(AtomicBool::new(true));
        let worker = {
            let running = RunningGuard(running.clone());
            let metrics = metrics.clone();
            let config = *config;
            let mut builder =
                std::thread::Builder::new().name(format!("vidd-swapchain-{}", handle.as_u64()));
            if let Some(bytes) = config.worker_stack_size {
                builder = builder.stack_size(bytes);
            }
            builder.spawn(move || {
                let _running = running;
                run_frame_loop(swap_chain, token, forward_tx, &metrics, &config)
            })
        };

        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                // The sender went down with the closure, so the forwarder drains and exits
                if let Some(forwarder) = forwarder {
                    let _ = forwarder.join();
                }
                return Err(ViddError::resource(format!(
                    "Failed to spawn swap-chain worker: {}",
                    e
                )));
            }
        };

        info!(
            "Processor {} started for swap-chain {}",
            handle, swap_chain_handle
        );

        Ok(Self {
            handle,
            swap_chain: swap_chain_handle,
            stop,
            running,
            worker: Some(worker),
            forwarder,
            metrics,
            exit: None,
        })
    }

    /// Processor identity
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Swap-chain this processor consumes
    pub fn swap_chain(&self) -> Handle {
        self.swap_chain
    }

    /// Whether the frame loop is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the worker thread has returned (stopped or revoked)
    pub fn has_exited(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }

    /// Live counters
    pub fn stats(&self) -> ProcessorStats {
        self.metrics.snapshot()
    }

    /// Stop the loop and wait for every thread to exit
    pub fn stop(mut self) -> ProcessorReport {
        let exit = self.shutdown();
        ProcessorReport {
            processor: self.handle,
            swap_chain: self.swap_chain,
            exit,
            stats: self.metrics.snapshot(),
        }
    }

    fn shutdown(&mut self) -> ExitReason {
        if let Some(ref exit) = self.exit {
            return exit.clone();
        }

        self.stop.signal();

        let exit = match self.worker.take() {
            Some(worker) => worker.join().unwrap_or_else(|_| {
                error!("Swap-chain worker {} panicked", self.handle);
                ExitReason::Panicked
            }),
            None => ExitReason::Stopped,
        };
        self.running.store(false, Ordering::SeqCst);

        if let Some(forwarder) = self.forwarder.take() {
            if forwarder.join().is_err() {
                error!("Forwarder of processor {} panicked", self.handle);
            }
        }

        let stats = self.metrics.snapshot();
        info!("Processor {} {}: {}", self.handle, exit, stats);
        self.exit = Some(exit.clone());
        exit
    }
}

/// Clears the running flag when the worker returns or unwinds
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Drop for SwapChainProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Acquire → process → release until stopped or revoked
fn run_frame_loop(
    mut swap_chain: Box<dyn SwapChain>,
    stop: StopToken,
    mut forward: Option<Sender<AcquiredFrame>>,
    metrics: &ProcessorMetrics,
    config: &ProcessorConfig,
) -> ExitReason {
    let handle = swap_chain.handle();

    loop {
        if stop.is_stopped() {
            return ExitReason::Stopped;
        }

        let frame = match swap_chain.acquire_next(&stop) {
            Acquire::Frame(frame) => frame,
            Acquire::Transient(message) => {
                let count = metrics.record_transient();
                warn!(
                    "Transient acquire failure on {}: {} ({} so far)",
                    handle, message, count
                );
                continue;
            }
            Acquire::Revoked(reason) => {
                info!("Swap-chain {} revoked: {}", handle, reason);
                return ExitReason::Revoked(reason);
            }
            Acquire::Cancelled => return ExitReason::Stopped,
        };

        let acquired_at = Instant::now();
        let present_id = frame.present_id();
        let count = metrics.record_acquire(frame.metadata.dirty_area());
        trace!(
            "Acquired frame {} ({} dirty rects)",
            present_id,
            frame.metadata.dirty_rects.len()
        );

        if let Some(ref tx) = forward {
            match tx.try_send(frame) {
                Ok(()) => metrics.record_forwarded(),
                Err(TrySendError::Full(_)) => {
                    let dropped = metrics.record_dropped();
                    debug!("Sink is behind, dropped frame {} ({} total)", present_id, dropped);
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("Forwarder exited, no longer forwarding frames");
                    forward = None;
                }
            }
        }

        if let Err(e) = swap_chain.release(present_id) {
            error!("Release of frame {} failed: {}", present_id, e);
            return ExitReason::Failed(e.to_string());
        }
        metrics.record_release(acquired_at.elapsed());

        if config.stats_interval > 0 && count % config.stats_interval == 0 {
            debug!("Swap-chain {}: {}", handle, metrics.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::SimulatedCompositor;
    use crate::types::DisplayMode;
    use std::time::Duration;

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stop_while_idle() {
        let mode = DisplayMode::new(16, 16, 60);
        let (_compositor, chain) = SimulatedCompositor::create(&mode, 2).unwrap();
        let processor =
            SwapChainProcessor::start(Box::new(chain), None, &ProcessorConfig::default()).unwrap();
        assert!(processor.is_running());

        let report = processor.stop();
        assert_eq!(report.exit, ExitReason::Stopped);
        assert_eq!(report.stats.frames_acquired, 0);
    }

    #[test]
    fn test_frames_released() {
        let mode = DisplayMode::new(16, 16, 60);
        let (compositor, chain) = SimulatedCompositor::create(&mode, 2).unwrap();
        let processor =
            SwapChainProcessor::start(Box::new(chain), None, &ProcessorConfig::default()).unwrap();

        for _ in 0..10 {
            wait_for(|| compositor.in_flight() < 2);
            compositor.present().unwrap();
        }
        wait_for(|| processor.stats().frames_released == 10);

        let report = processor.stop();
        assert_eq!(report.stats.frames_acquired, 10);
        assert_eq!(report.stats.frames_released, 10);
        assert_eq!(compositor.stats().violations, 0);
    }

    #[test]
    fn test_revoke_exits_loop() {
        let mode = DisplayMode::new(16, 16, 60);
        let (compositor, chain) = SimulatedCompositor::create(&mode, 2).unwrap();
        let processor =
            SwapChainProcessor::start(Box::new(chain), None, &ProcessorConfig::default()).unwrap();

        compositor.revoke(RevokeReason::ModeChange).unwrap();
        wait_for(|| processor.has_exited());
        assert!(!processor.is_running());

        let report = processor.stop();
        assert_eq!(report.exit, ExitReason::Revoked(RevokeReason::ModeChange));
    }
}
