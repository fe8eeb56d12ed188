//! Simulated compositor
//!
//! Stands in for the OS desktop compositor on machines without IddCx. The
//! [`CompositorHandle`] presents frames into a fixed ring of buffers; the
//! paired [`SimulatedSwapChain`] is what the driver acquires from. The ring
//! enforces the real swap-chain contract: a buffer is busy from present
//! until the driver releases it, and a release without a matching acquire
//! is counted as a violation.

use crossbeam_channel::{Receiver, Sender, select};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{Result, ViddError};
use crate::swapchain::{Acquire, RevokeReason, StopToken, SwapChain};
use crate::types::{
    AcquiredFrame, Bgra8, DisplayMode, FrameFormat, FrameMetadata, Handle, PixelFormat, Rect,
};

/// Buffers in a typical DWM swap-chain
pub const DEFAULT_RING_SIZE: usize = 3;

enum Presented {
    Frame(AcquiredFrame),
    Fault(String),
    Revoke(RevokeReason),
}

#[derive(Debug)]
struct RingState {
    ring_size: usize,
    in_flight: AtomicUsize,
    presented: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    violations: AtomicU64,
    revoked: AtomicBool,
}

/// Counters kept by the simulated compositor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompositorStats {
    /// Frames accepted by `present`
    pub presented: u64,
    /// Frames handed to the driver
    pub acquired: u64,
    /// Buffers handed back by the driver
    pub released: u64,
    /// Contract violations (double acquire, unmatched release)
    pub violations: u64,
    /// Buffers presented but not yet released
    pub in_flight: usize,
}

/// Presenting side of a simulated swap-chain
#[derive(Clone)]
pub struct CompositorHandle {
    tx: Sender<Presented>,
    state: Arc<RingState>,
    format: FrameFormat,
    next_present_id: Arc<AtomicU64>,
    started: Instant,
    with_pixels: bool,
}

/// Driver side of a simulated swap-chain
pub struct SimulatedSwapChain {
    handle: Handle,
    rx: Receiver<Presented>,
    state: Arc<RingState>,
    holding: Option<u64>,
}

/// Factory for simulated swap-chains
pub struct SimulatedCompositor;

impl SimulatedCompositor {
    /// Create a swap-chain of `ring_size` buffers for `mode`
    pub fn create(
        mode: &DisplayMode,
        ring_size: usize,
    ) -> Result<(CompositorHandle, SimulatedSwapChain)> {
        mode.validate()?;
        let format = FrameFormat::for_mode(mode, PixelFormat::Bgra8)?;
        let ring_size = ring_size.max(1);
        let (tx, rx) = crossbeam_channel::unbounded();
        let state = Arc::new(RingState {
            ring_size,
            in_flight: AtomicUsize::new(0),
            presented: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            revoked: AtomicBool::new(false),
        });

        let swap_chain = SimulatedSwapChain {
            handle: Handle::new(),
            rx,
            state: state.clone(),
            holding: None,
        };
        debug!(
            "Created simulated swap-chain {} ({} buffers, {})",
            swap_chain.handle, ring_size, mode
        );

        let handle = CompositorHandle {
            tx,
            state,
            format,
            next_present_id: Arc::new(AtomicU64::new(1)),
            started: Instant::now(),
            with_pixels: true,
        };

        Ok((handle, swap_chain))
    }
}

impl CompositorHandle {
    /// Present frames without a CPU-visible payload
    pub fn without_pixels(mut self) -> Self {
        self.with_pixels = false;
        self
    }

    /// Buffer format of this swap-chain
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Present a full-screen test pattern
    pub fn present(&self) -> Result<u64> {
        let full = Rect {
            left: 0,
            top: 0,
            right: self.format.width as i32,
            bottom: self.format.height as i32,
        };
        self.present_dirty(vec![full])
    }

    /// Present a frame that changed only in `dirty_rects`
    ///
    /// Fails when every buffer in the ring is presented or held.
    pub fn present_dirty(&self, dirty_rects: Vec<Rect>) -> Result<u64> {
        if self.state.revoked.load(Ordering::SeqCst) {
            return Err(ViddError::swap_chain("swap-chain has been revoked"));
        }

        let reserved = self.state.in_flight.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n < self.state.ring_size).then_some(n + 1)
        });
        if reserved.is_err() {
            return Err(ViddError::swap_chain(format!(
                "all {} buffers are busy",
                self.state.ring_size
            )));
        }

        let present_id = self.next_present_id.fetch_add(1, Ordering::SeqCst);
        let pixels = self
            .with_pixels
            .then(|| test_pattern(&self.format, present_id));
        let frame = AcquiredFrame {
            metadata: FrameMetadata {
                present_id,
                pts: self.started.elapsed().as_nanos() as u64,
                format: self.format,
                dirty_rects,
            },
            pixels,
        };

        if self.tx.send(Presented::Frame(frame)).is_err() {
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(ViddError::swap_chain("device removed"));
        }

        self.state.presented.fetch_add(1, Ordering::Relaxed);
        trace!("Presented frame {}", present_id);
        Ok(present_id)
    }

    /// Make the next acquire fail with a recoverable error
    pub fn inject_fault(&self, message: impl Into<String>) -> Result<()> {
        self.tx
            .send(Presented::Fault(message.into()))
            .map_err(|_| ViddError::swap_chain("device removed"))
    }

    /// Revoke the swap-chain; the driver sees this after draining queued frames
    pub fn revoke(&self, reason: RevokeReason) -> Result<()> {
        if self.state.revoked.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tx
            .send(Presented::Revoke(reason))
            .map_err(|_| ViddError::swap_chain("device removed"))
    }

    /// Buffers currently presented or held
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Counter snapshot
    pub fn stats(&self) -> CompositorStats {
        CompositorStats {
            presented: self.state.presented.load(Ordering::Relaxed),
            acquired: self.state.acquired.load(Ordering::Relaxed),
            released: self.state.released.load(Ordering::Relaxed),
            violations: self.state.violations.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

impl SwapChain for SimulatedSwapChain {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn acquire_next(&mut self, stop: &StopToken) -> Acquire {
        if let Some(held) = self.holding {
            self.state.violations.fetch_add(1, Ordering::Relaxed);
            warn!("Acquire while frame {} is still held", held);
        }

        if stop.is_stopped() {
            return Acquire::Cancelled;
        }

        select! {
            recv(self.rx) -> msg => match msg {
                Ok(Presented::Frame(frame)) => {
                    self.holding = Some(frame.present_id());
                    self.state.acquired.fetch_add(1, Ordering::Relaxed);
                    Acquire::Frame(frame)
                }
                Ok(Presented::Fault(message)) => Acquire::Transient(message),
                Ok(Presented::Revoke(reason)) => Acquire::Revoked(reason),
                Err(_) => Acquire::Revoked(RevokeReason::DeviceRemoved),
            },
            recv(stop.receiver()) -> _ => Acquire::Cancelled,
        }
    }

    fn release(&mut self, present_id: u64) -> Result<()> {
        match self.holding.take() {
            Some(held) if held == present_id => {
                self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.state.released.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Some(held) => {
                self.holding = Some(held);
                self.state.violations.fetch_add(1, Ordering::Relaxed);
                Err(ViddError::swap_chain(format!(
                    "release of frame {} while holding frame {}",
                    present_id, held
                )))
            }
            None => {
                self.state.violations.fetch_add(1, Ordering::Relaxed);
                Err(ViddError::swap_chain(format!(
                    "release of frame {} without a matching acquire",
                    present_id
                )))
            }
        }
    }
}

/// Horizontal gradient that scrolls one column per frame
fn test_pattern(format: &FrameFormat, present_id: u64) -> Arc<[u8]> {
    let width = format.width.max(1) as u64;
    let row: Vec<Bgra8> = (0..width)
        .map(|x| {
            let shade = (((x + present_id) % width) * 255 / width) as u8;
            Bgra8::rgb(shade, 255 - shade, (present_id % 256) as u8)
        })
        .collect();

    let mut buffer = Vec::with_capacity(format.frame_size());
    for _ in 0..format.height {
        buffer.extend_from_slice(bytemuck::cast_slice(&row));
    }
    Arc::from(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swapchain::stop_pair;

    const MODE: DisplayMode = DisplayMode::new(64, 32, 60);

    #[test]
    fn test_present_acquire_release() {
        let (compositor, mut chain) = SimulatedCompositor::create(&MODE, 2).unwrap();
        let (_stop, token) = stop_pair();

        let id = compositor.present().unwrap();
        let Acquire::Frame(frame) = chain.acquire_next(&token) else {
            panic!("expected a frame");
        };
        assert_eq!(frame.present_id(), id);
        assert_eq!(frame.pixels.as_ref().unwrap().len(), compositor.format().frame_size());
        assert_eq!(frame.metadata.dirty_area(), MODE.pixel_count());

        chain.release(id).unwrap();
        let stats = compositor.stats();
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.violations, 0);
    }

    #[test]
    fn test_rejects_unrepresentable_mode() {
        let result = SimulatedCompositor::create(&DisplayMode::new(u32::MAX, 1080, 60), DEFAULT_RING_SIZE);
        assert!(result.is_err_and(|e| e.is_configuration()));
    }

    #[test]
    fn test_ring_exhaustion() {
        let (compositor, _chain) = SimulatedCompositor::create(&MODE, 2).unwrap();
        compositor.present().unwrap();
        compositor.present().unwrap();
        let err = compositor.present().unwrap_err();
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_unmatched_release_is_violation() {
        let (compositor, mut chain) = SimulatedCompositor::create(&MODE, 2).unwrap();
        assert!(chain.release(7).is_err());
        assert_eq!(compositor.stats().violations, 1);
    }

    #[test]
    fn test_fault_and_revoke() {
        let (compositor, mut chain) = SimulatedCompositor::create(&MODE, 2).unwrap();
        let (_stop, token) = stop_pair();

        compositor.inject_fault("access lost").unwrap();
        compositor.revoke(RevokeReason::ModeChange).unwrap();
        assert!(matches!(chain.acquire_next(&token), Acquire::Transient(_)));
        assert!(matches!(
            chain.acquire_next(&token),
            Acquire::Revoked(RevokeReason::ModeChange)
        ));
        assert!(compositor.present().is_err());
    }

    #[test]
    fn test_dropped_compositor_means_device_removed() {
        let (compositor, mut chain) = SimulatedCompositor::create(&MODE, 2).unwrap();
        let (_stop, token) = stop_pair();
        drop(compositor);
        assert!(matches!(
            chain.acquire_next(&token),
            Acquire::Revoked(RevokeReason::DeviceRemoved)
        ));
    }

    #[test]
    fn test_stop_cancels_blocked_acquire() {
        let (_compositor, mut chain) = SimulatedCompositor::create(&MODE, 2).unwrap();
        let (mut stop, token) = stop_pair();
        let waiter = std::thread::spawn(move || matches!(chain.acquire_next(&token), Acquire::Cancelled));
        std::thread::sleep(std::time::Duration::from_millis(20));
        stop.signal();
        assert!(waiter.join().unwrap());
    }
}
