//! OS callback boundary
//!
//! The display framework drives the core through a fixed set of callbacks.
//! Each one returns an NTSTATUS-style code; errors never cross this
//! boundary as values or panics.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::adapter::Adapter;
use crate::config::{AdapterCaps, MonitorDescriptor, ProcessorConfig};
use crate::error::{Result, ViddError};
use crate::sink::FrameSink;
use crate::swapchain::SwapChain;
use crate::types::{ConnectorIndex, DeviceHandle, DisplayMode};

/// NTSTATUS-style result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverStatus(pub u32);

impl DriverStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const UNSUCCESSFUL: Self = Self(0xC000_0001);
    pub const INVALID_PARAMETER: Self = Self(0xC000_000D);
    pub const OBJECT_NAME_COLLISION: Self = Self(0xC000_0035);
    pub const INSUFFICIENT_RESOURCES: Self = Self(0xC000_009A);
    pub const INVALID_DEVICE_STATE: Self = Self(0xC000_0184);
    pub const NOT_FOUND: Self = Self(0xC000_0225);

    /// Whether this is a success code
    pub fn is_success(&self) -> bool {
        (self.0 as i32) >= 0
    }

    /// Symbolic name, for known codes
    pub fn name(&self) -> &'static str {
        match *self {
            Self::SUCCESS => "STATUS_SUCCESS",
            Self::UNSUCCESSFUL => "STATUS_UNSUCCESSFUL",
            Self::INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            Self::OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
            Self::INSUFFICIENT_RESOURCES => "STATUS_INSUFFICIENT_RESOURCES",
            Self::INVALID_DEVICE_STATE => "STATUS_INVALID_DEVICE_STATE",
            Self::NOT_FOUND => "STATUS_NOT_FOUND",
            _ => "STATUS_UNKNOWN",
        }
    }
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl From<&ViddError> for DriverStatus {
    fn from(err: &ViddError) -> Self {
        match err.root() {
            ViddError::Config(_) => Self::INVALID_PARAMETER,
            ViddError::Capacity { .. } => Self::INSUFFICIENT_RESOURCES,
            ViddError::InvalidState { .. } => Self::INVALID_DEVICE_STATE,
            ViddError::MonitorNotFound(_) => Self::NOT_FOUND,
            ViddError::ConnectorInUse(_) => Self::OBJECT_NAME_COLLISION,
            ViddError::Resource(_) => Self::INSUFFICIENT_RESOURCES,
            _ => Self::UNSUCCESSFUL,
        }
    }
}

/// Callbacks the display framework invokes on the driver
///
/// Calls may arrive concurrently from arbitrary threads.
pub trait IndirectDisplayCallbacks: Send + Sync {
    /// Adapter initialization finished; register capabilities
    fn adapter_init(&self, device: DeviceHandle, caps: AdapterCaps) -> DriverStatus;

    /// Create a monitor on a connector
    fn monitor_create(
        &self,
        connector: ConnectorIndex,
        descriptor: MonitorDescriptor,
    ) -> DriverStatus;

    /// Plug the monitor in
    fn monitor_arrival(&self, connector: ConnectorIndex) -> DriverStatus;

    /// Unplug the monitor
    fn monitor_departure(&self, connector: ConnectorIndex) -> DriverStatus;

    /// The OS hands the monitor a swap-chain
    fn assign_swap_chain(
        &self,
        connector: ConnectorIndex,
        swap_chain: Box<dyn SwapChain>,
    ) -> DriverStatus;

    /// The OS takes the swap-chain back
    fn unassign_swap_chain(&self, connector: ConnectorIndex) -> DriverStatus;

    /// The OS committed a mode
    fn commit_modes(&self, connector: ConnectorIndex, mode: DisplayMode) -> DriverStatus;

    /// Driver unload
    fn adapter_release(&self) -> DriverStatus;
}

/// Callback implementation over one [`Adapter`]
#[derive(Default)]
pub struct Driver {
    adapter: Mutex<Option<Arc<Adapter>>>,
    processor_config: ProcessorConfig,
    sink: Option<Arc<dyn FrameSink>>,
}

impl Driver {
    /// Driver with default processor tuning and no sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Processor tuning for adapters initialized from now on
    pub fn with_processor_config(mut self, config: ProcessorConfig) -> Self {
        self.processor_config = config;
        self
    }

    /// Sink handed to adapters initialized from now on
    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The live adapter, if initialized
    pub fn adapter(&self) -> Option<Arc<Adapter>> {
        self.adapter.lock().clone()
    }

    fn live_adapter(&self) -> Result<Arc<Adapter>> {
        self.adapter()
            .ok_or_else(|| ViddError::invalid_state("handle callback", "no adapter is initialized"))
    }

    fn complete<T>(operation: &str, result: Result<T>) -> DriverStatus {
        let status = DriverStatus::from(&result);
        if let Err(ref e) = result {
            if e.is_user_recoverable() {
                warn!("{} failed: {} -> {}", operation, e, status);
            } else {
                error!("{} failed: {} -> {}", operation, e, status);
            }
        }
        status
    }
}

impl<T> From<&Result<T>> for DriverStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::SUCCESS,
            Err(e) => Self::from(e),
        }
    }
}

impl IndirectDisplayCallbacks for Driver {
    fn adapter_init(&self, device: DeviceHandle, caps: AdapterCaps) -> DriverStatus {
        let mut slot = self.adapter.lock();
        if slot.is_some() {
            return Self::complete(
                "Adapter init",
                Err::<(), _>(ViddError::invalid_state("initialize adapter", "an adapter is live")),
            );
        }

        let result = Adapter::new(device, caps).map(|adapter| {
            let adapter = adapter.with_processor_config(self.processor_config);
            match self.sink.clone() {
                Some(sink) => adapter.with_sink(sink),
                None => adapter,
            }
        });

        match result {
            Ok(adapter) => {
                *slot = Some(Arc::new(adapter));
                DriverStatus::SUCCESS
            }
            Err(e) => Self::complete("Adapter init", Err::<(), _>(e)),
        }
    }

    fn monitor_create(
        &self,
        connector: ConnectorIndex,
        descriptor: MonitorDescriptor,
    ) -> DriverStatus {
        let result = self
            .live_adapter()
            .and_then(|adapter| adapter.create_monitor_at(connector, descriptor));
        Self::complete("Monitor create", result)
    }

    fn monitor_arrival(&self, connector: ConnectorIndex) -> DriverStatus {
        let result = self
            .live_adapter()
            .and_then(|adapter| adapter.require_monitor(connector))
            .and_then(|monitor| monitor.arrive());
        Self::complete("Monitor arrival", result)
    }

    fn monitor_departure(&self, connector: ConnectorIndex) -> DriverStatus {
        let result = self
            .live_adapter()
            .and_then(|adapter| adapter.depart_monitor(connector));
        Self::complete("Monitor departure", result)
    }

    fn assign_swap_chain(
        &self,
        connector: ConnectorIndex,
        swap_chain: Box<dyn SwapChain>,
    ) -> DriverStatus {
        let result = self
            .live_adapter()
            .and_then(|adapter| adapter.require_monitor(connector))
            .and_then(|monitor| monitor.assign_swap_chain(swap_chain));
        Self::complete("Swap-chain assignment", result)
    }

    fn unassign_swap_chain(&self, connector: ConnectorIndex) -> DriverStatus {
        let result = self
            .live_adapter()
            .and_then(|adapter| adapter.require_monitor(connector))
            .and_then(|monitor| monitor.unassign_swap_chain());
        Self::complete("Swap-chain unassignment", result)
    }

    fn commit_modes(&self, connector: ConnectorIndex, mode: DisplayMode) -> DriverStatus {
        let result = self
            .live_adapter()
            .and_then(|adapter| adapter.require_monitor(connector))
            .and_then(|monitor| monitor.commit_mode(mode));
        Self::complete("Mode commit", result)
    }

    fn adapter_release(&self) -> DriverStatus {
        let adapter = self.adapter.lock().take();
        match adapter {
            Some(adapter) => {
                adapter.teardown();
                info!("Adapter released");
                DriverStatus::SUCCESS
            }
            None => Self::complete(
                "Adapter release",
                Err::<(), _>(ViddError::invalid_state("release adapter", "no adapter is initialized")),
            ),
        }
    }
}
