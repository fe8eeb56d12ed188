//! Swap-chain seam
//!
//! The OS hands the driver a swap-chain: a small ring of buffers that the
//! compositor fills and the driver consumes one at a time. This module
//! models that contract as a trait so the frame loop can run against the
//! OS, a simulator, or a scripted mock.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::types::{AcquiredFrame, Handle};

/// Why a swap-chain stopped delivering frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RevokeReason {
    /// The OS unassigned the swap-chain (mode change, monitor departure)
    Unassigned,
    /// The OS is switching modes
    ModeChange,
    /// The rendering device went away
    DeviceRemoved,
    /// Anything else the compositor reported
    Other(String),
}

impl std::fmt::Display for RevokeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unassigned => write!(f, "unassigned"),
            Self::ModeChange => write!(f, "mode change"),
            Self::DeviceRemoved => write!(f, "device removed"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Outcome of one acquire call
#[derive(Debug)]
pub enum Acquire {
    /// A buffer is now held and must be released exactly once
    Frame(AcquiredFrame),
    /// Recoverable failure; the next acquire may succeed
    Transient(String),
    /// The swap-chain is gone; no further frames will arrive
    Revoked(RevokeReason),
    /// The stop token fired while waiting
    Cancelled,
}

/// A swap-chain as seen from the driver
///
/// Implementations are moved onto the processor's worker thread and used
/// only from there.
pub trait SwapChain: Send + 'static {
    /// Identity of this swap-chain
    fn handle(&self) -> Handle;

    /// Block until the next frame is ready, the swap-chain is revoked,
    /// or `stop` fires
    fn acquire_next(&mut self, stop: &StopToken) -> Acquire;

    /// Hand the buffer from the last successful acquire back to the compositor
    fn release(&mut self, present_id: u64) -> Result<()>;
}

/// Requests cancellation of a blocked acquire
#[derive(Debug)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    tx: Option<Sender<()>>,
}

/// Observes cancellation from the worker side
///
/// The channel never carries a message; disconnection is the signal, so a
/// `select!` on [`StopToken::receiver`] wakes as soon as stop is requested.
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
    rx: Receiver<()>,
}

/// Create a connected stop handle/token pair
pub fn stop_pair() -> (StopHandle, StopToken) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    let flag = Arc::new(AtomicBool::new(false));
    (
        StopHandle {
            flag: flag.clone(),
            tx: Some(tx),
        },
        StopToken { flag, rx },
    )
}

impl StopHandle {
    /// Request stop; idempotent
    pub fn signal(&mut self) {
        self.flag.store(true, Ordering::SeqCst);
        self.tx.take();
    }
}

impl StopToken {
    /// Whether stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Channel that becomes ready (disconnected) when stop is requested
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::RecvTimeoutError;
    use std::time::{Duration, Instant};

    #[test]
    fn test_signal_wakes_waiter() {
        let (mut handle, token) = stop_pair();
        let waiter = std::thread::spawn(move || {
            let start = Instant::now();
            let woke = token.receiver().recv_timeout(Duration::from_secs(10));
            (woke == Err(RecvTimeoutError::Disconnected) && token.is_stopped(), start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        handle.signal();
        let (stopped, elapsed) = waiter.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_without_signal() {
        let (_handle, token) = stop_pair();
        assert_eq!(
            token.receiver().recv_timeout(Duration::from_millis(5)),
            Err(RecvTimeoutError::Timeout)
        );
        assert!(!token.is_stopped());
    }

    #[test]
    fn test_signal_is_idempotent() {
        let (mut handle, token) = stop_pair();
        handle.signal();
        handle.signal();
        assert!(token.is_stopped());
        assert_eq!(
            token.receiver().try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        );
    }
}
