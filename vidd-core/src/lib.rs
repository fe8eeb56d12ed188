//! vidd Core Library
//!
//! Adapter, monitor and swap-chain processing core of a virtual indirect
//! display driver.
//!
//! This library provides:
//! - An adapter that owns virtual monitors keyed by connector index
//! - The monitor lifecycle (created, arrived, active, departed)
//! - A swap-chain processor that acquires and releases frames on its own
//!   thread and forwards them to an optional frame sink
//! - EDID generation and mode lists
//! - A simulated compositor for running everything without the OS
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  callbacks  ┌─────────┐     ┌─────────┐     ┌───────────────┐
//! │ OS / sim │────────────▶│ Adapter │────▶│ Monitor │────▶│ SwapChain     │
//! │          │             │         │  1:N│         │  1:1│ Processor     │
//! └──────────┘             └─────────┘     └─────────┘     └───────┬───────┘
//!       ▲                                                          │
//!       └───────────── acquire / release (worker thread) ──────────┤
//!                                                                  ▼
//!                                                            ┌───────────┐
//!                                                            │ FrameSink │
//!                                                            └───────────┘
//! ```

pub mod adapter;
pub mod compositor;
pub mod config;
pub mod driver;
pub mod edid;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod processor;
pub mod sink;
pub mod swapchain;
pub mod types;

pub use adapter::Adapter;
pub use compositor::{CompositorHandle, SimulatedCompositor, SimulatedSwapChain};
pub use config::{AdapterCaps, ConfigFile, MonitorDescriptor, ProcessorConfig};
pub use driver::{Driver, DriverStatus, IndirectDisplayCallbacks};
pub use error::{Result, ViddError};
pub use monitor::{Monitor, MonitorState};
pub use processor::{ExitReason, ProcessorReport, SwapChainProcessor};
pub use sink::FrameSink;
pub use swapchain::{Acquire, RevokeReason, StopToken, SwapChain};
pub use types::{AcquiredFrame, ConnectorIndex, DeviceHandle, DisplayMode, Handle};
