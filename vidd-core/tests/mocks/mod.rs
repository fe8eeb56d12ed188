//! Mock infrastructure for testing
//!
//! Provides a scripted swap-chain that records every acquire and release,
//! a recording frame sink, and descriptor factories.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use vidd_core::config::{AdapterCaps, MonitorDescriptor, MonitorIdentity};
use vidd_core::error::{Result, ViddError};
use vidd_core::swapchain::{Acquire, RevokeReason, StopToken, SwapChain};
use vidd_core::types::{
    AcquiredFrame, DisplayMode, FrameFormat, FrameMetadata, Handle, PixelFormat, Rect,
};
use vidd_core::FrameSink;

/// The single mode used by lifecycle scenarios
pub const MODE_1080P: DisplayMode = DisplayMode::new(1920, 1080, 60);

/// One scripted acquire outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Return the next frame immediately
    Frame,
    /// Sleep (ignoring stop), then return a frame
    SlowFrame(Duration),
    /// Recoverable failure
    Transient,
    /// Swap-chain revoked
    Revoke(RevokeReason),
    /// Return a frame whose release the swap-chain then refuses
    RejectRelease,
    /// Panic inside acquire
    Panic,
}

/// Everything a scripted swap-chain observed
#[derive(Debug, Default)]
pub struct SwapChainLog {
    acquired: Mutex<Vec<u64>>,
    released: Mutex<Vec<u64>>,
    violations: Mutex<Vec<String>>,
    transients: Mutex<u64>,
    dropped: AtomicBool,
}

impl SwapChainLog {
    pub fn acquired(&self) -> Vec<u64> {
        self.acquired.lock().clone()
    }

    pub fn released(&self) -> Vec<u64> {
        self.released.lock().clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().clone()
    }

    pub fn transients(&self) -> u64 {
        *self.transients.lock()
    }

    /// Whether the swap-chain object has been destroyed (worker finished with it)
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Swap-chain that plays back a fixed list of outcomes
///
/// Once the script runs out, acquire blocks until stop is requested.
pub struct ScriptedSwapChain {
    handle: Handle,
    steps: VecDeque<Step>,
    next_present_id: u64,
    holding: Option<u64>,
    reject_release: bool,
    format: FrameFormat,
    log: Arc<SwapChainLog>,
}

impl ScriptedSwapChain {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, Arc<SwapChainLog>) {
        let log = Arc::new(SwapChainLog::default());
        let chain = Self {
            handle: Handle::new(),
            steps: steps.into_iter().collect(),
            next_present_id: 1,
            holding: None,
            reject_release: false,
            format: FrameFormat::for_mode(&DisplayMode::new(4, 4, 60), PixelFormat::Bgra8).unwrap(),
            log: log.clone(),
        };
        (chain, log)
    }

    /// `count` immediate frames
    pub fn frames(count: usize) -> (Self, Arc<SwapChainLog>) {
        Self::new(std::iter::repeat_n(Step::Frame, count))
    }

    fn next_frame(&mut self) -> Acquire {
        let present_id = self.next_present_id;
        self.next_present_id += 1;
        self.holding = Some(present_id);
        self.log.acquired.lock().push(present_id);

        Acquire::Frame(AcquiredFrame {
            metadata: FrameMetadata {
                present_id,
                pts: present_id * 16_666_667,
                format: self.format,
                dirty_rects: vec![Rect {
                    left: 0,
                    top: 0,
                    right: 4,
                    bottom: 4,
                }],
            },
            pixels: Some(Arc::from(vec![0x80u8; self.format.frame_size()])),
        })
    }
}

impl SwapChain for ScriptedSwapChain {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn acquire_next(&mut self, stop: &StopToken) -> Acquire {
        if let Some(held) = self.holding {
            self.log
                .violations
                .lock()
                .push(format!("acquire while holding frame {}", held));
        }

        match self.steps.pop_front() {
            Some(Step::Frame) => self.next_frame(),
            Some(Step::SlowFrame(delay)) => {
                std::thread::sleep(delay);
                self.next_frame()
            }
            Some(Step::Transient) => {
                *self.log.transients.lock() += 1;
                Acquire::Transient("scripted failure".to_string())
            }
            Some(Step::Revoke(reason)) => Acquire::Revoked(reason),
            Some(Step::RejectRelease) => {
                self.reject_release = true;
                self.next_frame()
            }
            Some(Step::Panic) => panic!("scripted acquire panic"),
            None => {
                // Nothing left to hand out; wait for cancellation
                let _ = stop.receiver().recv();
                Acquire::Cancelled
            }
        }
    }

    fn release(&mut self, present_id: u64) -> Result<()> {
        if std::mem::take(&mut self.reject_release) {
            self.holding = None;
            return Err(ViddError::swap_chain(format!(
                "buffer {} was reclaimed by the compositor",
                present_id
            )));
        }

        match self.holding.take() {
            Some(held) if held == present_id => {
                self.log.released.lock().push(present_id);
                Ok(())
            }
            other => {
                let message = format!("release of {} while holding {:?}", present_id, other);
                self.log.violations.lock().push(message.clone());
                Err(ViddError::swap_chain(message))
            }
        }
    }
}

impl Drop for ScriptedSwapChain {
    fn drop(&mut self) {
        self.log.dropped.store(true, Ordering::SeqCst);
    }
}

/// Sink that records what it receives, optionally slowly
pub struct RecordingSink {
    delay: Duration,
    received: Mutex<Vec<u64>>,
    flushed: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            received: Mutex::new(Vec::new()),
            flushed: AtomicBool::new(false),
        })
    }

    pub fn received(&self) -> Vec<u64> {
        self.received.lock().clone()
    }

    pub fn was_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }
}

impl FrameSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn accept(&self, frame: AcquiredFrame) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.received.lock().push(frame.present_id());
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.flushed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Capability block with the given monitor limit
pub fn caps(max_monitors: u32) -> AdapterCaps {
    AdapterCaps::default().with_max_monitors(max_monitors)
}

/// Descriptor advertising only 1920x1080@60
pub fn descriptor_1080p() -> MonitorDescriptor {
    MonitorDescriptor::from_identity(&MonitorIdentity::default(), &[MODE_1080P])
        .expect("valid descriptor")
}

/// Descriptor with a valid EDID but no modes
pub fn empty_descriptor() -> MonitorDescriptor {
    MonitorDescriptor::new(descriptor_1080p().edid().to_vec(), Vec::new())
}

/// Poll `cond` until it holds, panicking after five seconds
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
