//! Virtual monitor lifecycle
//!
//! ```text
//!  Created ──arrive──▶ Arrived ──assign──▶ Active
//!     │                  ▲  │                │
//!     │                  └──┼──unassign──────┤
//!     │                     │    (or revoke) │
//!     └───teardown──────────┴──depart────────┴──▶ Departed
//! ```
//!
//! Each monitor has its own lock. Callbacks for different monitors never
//! contend, and the processor's worker thread never takes this lock: a
//! worker that exits on its own (revoked swap-chain) is joined lazily the
//! next time the monitor is touched.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{MonitorDescriptor, ProcessorConfig};
use crate::error::{Result, ViddError};
use crate::metrics::ProcessorStats;
use crate::processor::{ProcessorReport, SwapChainProcessor};
use crate::sink::FrameSink;
use crate::swapchain::SwapChain;
use crate::types::{ConnectorIndex, DisplayMode, Handle};

/// Lifecycle state of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// Created on the adapter; the OS does not know about it yet
    Created,
    /// Plugged in; the OS may assign a swap-chain
    Arrived,
    /// A swap-chain processor is running
    Active,
    /// Unplugged; terminal
    Departed,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Arrived => write!(f, "arrived"),
            Self::Active => write!(f, "active"),
            Self::Departed => write!(f, "departed"),
        }
    }
}

struct MonitorInner {
    state: MonitorState,
    processor: Option<SwapChainProcessor>,
    current_mode: Option<DisplayMode>,
    last_report: Option<ProcessorReport>,
}

/// One virtual display endpoint
pub struct Monitor {
    connector: ConnectorIndex,
    descriptor: MonitorDescriptor,
    processor_config: ProcessorConfig,
    sink: Option<Arc<dyn FrameSink>>,
    inner: Mutex<MonitorInner>,
}

impl Monitor {
    pub(crate) fn new(
        connector: ConnectorIndex,
        descriptor: MonitorDescriptor,
        processor_config: ProcessorConfig,
        sink: Option<Arc<dyn FrameSink>>,
    ) -> Self {
        Self {
            connector,
            descriptor,
            processor_config,
            sink,
            inner: Mutex::new(MonitorInner {
                state: MonitorState::Created,
                processor: None,
                current_mode: None,
                last_report: None,
            }),
        }
    }

    /// Connector index on the owning adapter
    pub fn connector(&self) -> ConnectorIndex {
        self.connector
    }

    /// EDID and modes
    pub fn descriptor(&self) -> &MonitorDescriptor {
        &self.descriptor
    }

    /// Current state
    pub fn state(&self) -> MonitorState {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);
        inner.state
    }

    /// Whether the monitor has departed
    ///
    /// Never joins a worker, so it is safe under the adapter lock.
    pub fn is_departed(&self) -> bool {
        self.inner.lock().state == MonitorState::Departed
    }

    /// Announce the monitor to the OS
    ///
    /// The descriptor is validated here; on failure the monitor stays
    /// `Created`.
    pub fn arrive(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != MonitorState::Created {
            return Err(ViddError::invalid_state("signal arrival", inner.state));
        }

        self.descriptor.validate()?;

        inner.state = MonitorState::Arrived;
        inner.current_mode = self.descriptor.preferred_mode();
        info!(
            "Monitor {} arrived ({} modes, preferred {})",
            self.connector,
            self.descriptor.modes().len(),
            inner
                .current_mode
                .map(|m| m.to_string())
                .unwrap_or_default()
        );
        Ok(())
    }

    /// Start processing a swap-chain
    ///
    /// An active processor is fully stopped before the new one starts.
    /// Returns the new processor's handle.
    pub fn assign_swap_chain(&self, swap_chain: Box<dyn SwapChain>) -> Result<Handle> {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);

        match inner.state {
            MonitorState::Arrived => {}
            MonitorState::Active => {
                debug!("Monitor {} replacing its swap-chain", self.connector);
                self.retire(&mut inner);
            }
            state => return Err(ViddError::invalid_state("assign swap-chain", state)),
        }

        match SwapChainProcessor::start(swap_chain, self.sink.clone(), &self.processor_config) {
            Ok(processor) => {
                let handle = processor.handle();
                inner.processor = Some(processor);
                inner.state = MonitorState::Active;
                Ok(handle)
            }
            Err(e) => {
                warn!("Monitor {} could not start a processor: {}", self.connector, e);
                inner.state = MonitorState::Arrived;
                Err(e)
            }
        }
    }

    /// Stop the running processor
    ///
    /// Returns its report, or `None` when no processor was running.
    pub fn unassign_swap_chain(&self) -> Result<Option<ProcessorReport>> {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);

        match inner.state {
            MonitorState::Active => Ok(self.retire(&mut inner)),
            MonitorState::Arrived => Ok(None),
            state => Err(ViddError::invalid_state("unassign swap-chain", state)),
        }
    }

    /// Unplug the monitor, stopping any processor first
    pub fn depart(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);

        match inner.state {
            MonitorState::Active => {
                self.retire(&mut inner);
            }
            MonitorState::Arrived => {}
            state => return Err(ViddError::invalid_state("depart", state)),
        }

        inner.state = MonitorState::Departed;
        info!("Monitor {} departed", self.connector);
        Ok(())
    }

    /// Move to `Departed` from any state; used by adapter teardown
    pub(crate) fn force_depart(&self) {
        let mut inner = self.inner.lock();
        if inner.processor.is_some() {
            self.retire(&mut inner);
        }
        if inner.state != MonitorState::Departed {
            debug!("Monitor {} departed with its adapter", self.connector);
            inner.state = MonitorState::Departed;
        }
    }

    /// Modes offered to the OS for this monitor, preferred first
    pub fn target_modes(&self) -> Vec<DisplayMode> {
        self.descriptor.modes().to_vec()
    }

    /// Record the mode the OS committed
    ///
    /// The OS unassigns the swap-chain around a mode change; this only
    /// updates bookkeeping.
    pub fn commit_mode(&self, mode: DisplayMode) -> Result<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, MonitorState::Created | MonitorState::Departed) {
            return Err(ViddError::invalid_state("commit mode", inner.state));
        }
        if !self.descriptor.supports(&mode) {
            return Err(ViddError::config(format!(
                "Mode {} is not offered by monitor {}",
                mode, self.connector
            )));
        }
        if inner.current_mode != Some(mode) {
            info!("Monitor {} committed mode {}", self.connector, mode);
            inner.current_mode = Some(mode);
        }
        Ok(())
    }

    /// Mode last committed (the preferred mode after arrival)
    pub fn current_mode(&self) -> Option<DisplayMode> {
        self.inner.lock().current_mode
    }

    /// Counters of the running processor
    pub fn processor_stats(&self) -> Option<ProcessorStats> {
        self.inner.lock().processor.as_ref().map(|p| p.stats())
    }

    /// Report of the most recently retired processor
    pub fn last_report(&self) -> Option<ProcessorReport> {
        let mut inner = self.inner.lock();
        self.reap(&mut inner);
        inner.last_report.clone()
    }

    /// Join a worker that exited on its own and fall back to `Arrived`
    fn reap(&self, inner: &mut MonitorInner) {
        let exited = inner.processor.as_ref().is_some_and(|p| p.has_exited());
        if exited && inner.state == MonitorState::Active {
            debug!("Monitor {} reaping finished processor", self.connector);
            self.retire(inner);
        }
    }

    fn retire(&self, inner: &mut MonitorInner) -> Option<ProcessorReport> {
        let report = inner.processor.take()?.stop();
        if inner.state == MonitorState::Active {
            inner.state = MonitorState::Arrived;
        }
        inner.last_report = Some(report.clone());
        Some(report)
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("connector", &self.connector)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.force_depart();
    }
}
