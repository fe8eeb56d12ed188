//! Virtual display adapter
//!
//! Owns the set of monitors keyed by connector index. The adapter lock only
//! guards the map: monitors are cloned out before any monitor lock is taken
//! or any worker is joined.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::config::{AdapterCaps, MonitorDescriptor, ProcessorConfig};
use crate::error::{Result, ViddError};
use crate::monitor::Monitor;
use crate::sink::FrameSink;
use crate::types::{ConnectorIndex, DeviceHandle};

/// The virtual display adapter
pub struct Adapter {
    device: DeviceHandle,
    caps: AdapterCaps,
    processor_config: ProcessorConfig,
    sink: Option<Arc<dyn FrameSink>>,
    monitors: Mutex<BTreeMap<ConnectorIndex, Arc<Monitor>>>,
    torn_down: AtomicBool,
}

impl Adapter {
    /// Initialize an adapter with a validated capability block
    pub fn new(device: DeviceHandle, caps: AdapterCaps) -> Result<Self> {
        caps.validate()?;

        info!(
            "Adapter initialized: {} ({}, {}), up to {} monitor(s)",
            caps.endpoint.friendly_name,
            caps.endpoint.manufacturer,
            caps.endpoint.model,
            caps.max_monitors
        );

        Ok(Self {
            device,
            caps,
            processor_config: ProcessorConfig::default(),
            sink: None,
            monitors: Mutex::new(BTreeMap::new()),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Processor tuning applied to monitors created from now on
    pub fn with_processor_config(mut self, config: ProcessorConfig) -> Self {
        self.processor_config = config;
        self
    }

    /// Frame sink shared by every monitor's processor
    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// OS device handle
    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    /// Capability block
    pub fn caps(&self) -> &AdapterCaps {
        &self.caps
    }

    /// Processor tuning
    pub fn processor_config(&self) -> &ProcessorConfig {
        &self.processor_config
    }

    /// Create a monitor on the lowest free connector
    pub fn create_monitor(&self, descriptor: MonitorDescriptor) -> Result<Arc<Monitor>> {
        let mut monitors = self.monitors.lock();
        self.check_capacity(&monitors)?;

        let connector = (0..self.caps.max_monitors)
            .map(ConnectorIndex)
            .find(|c| !Self::is_live(&monitors, c))
            .ok_or(ViddError::Capacity {
                max: self.caps.max_monitors,
            })?;

        Ok(self.insert(&mut monitors, connector, descriptor))
    }

    /// Create a monitor on a specific connector
    ///
    /// A full adapter reports [`ViddError::Capacity`] before the connector
    /// itself is checked.
    pub fn create_monitor_at(
        &self,
        connector: ConnectorIndex,
        descriptor: MonitorDescriptor,
    ) -> Result<Arc<Monitor>> {
        let mut monitors = self.monitors.lock();
        self.check_capacity(&monitors)?;

        if connector.0 >= self.caps.max_monitors {
            return Err(ViddError::config(format!(
                "Connector {} is out of range (adapter has {})",
                connector, self.caps.max_monitors
            )));
        }
        if Self::is_live(&monitors, &connector) {
            return Err(ViddError::ConnectorInUse(connector));
        }

        Ok(self.insert(&mut monitors, connector, descriptor))
    }

    /// Monitor on a connector, if any
    pub fn monitor(&self, connector: ConnectorIndex) -> Option<Arc<Monitor>> {
        self.monitors.lock().get(&connector).cloned()
    }

    /// Monitor on a connector, or [`ViddError::MonitorNotFound`]
    pub fn require_monitor(&self, connector: ConnectorIndex) -> Result<Arc<Monitor>> {
        self.monitor(connector)
            .ok_or(ViddError::MonitorNotFound(connector))
    }

    /// All monitors in connector order
    pub fn monitors(&self) -> Vec<Arc<Monitor>> {
        self.monitors.lock().values().cloned().collect()
    }

    /// Monitors that have not departed
    pub fn monitor_count(&self) -> usize {
        self.monitors()
            .iter()
            .filter(|m| !m.is_departed())
            .count()
    }

    /// Depart a monitor and free its connector
    pub fn depart_monitor(&self, connector: ConnectorIndex) -> Result<()> {
        let monitor = self.require_monitor(connector)?;
        monitor.depart()?;

        let mut monitors = self.monitors.lock();
        if monitors
            .get(&connector)
            .is_some_and(|m| Arc::ptr_eq(m, &monitor))
        {
            monitors.remove(&connector);
        }
        Ok(())
    }

    /// Depart every monitor and refuse further creation
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let monitors: Vec<_> = {
            let mut map = self.monitors.lock();
            std::mem::take(&mut *map).into_values().collect()
        };

        for monitor in &monitors {
            monitor.force_depart();
        }

        info!("Adapter torn down ({} monitor(s) departed)", monitors.len());
    }

    /// Whether teardown has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn is_live(monitors: &BTreeMap<ConnectorIndex, Arc<Monitor>>, connector: &ConnectorIndex) -> bool {
        monitors
            .get(connector)
            .is_some_and(|m| !m.is_departed())
    }

    fn check_capacity(&self, monitors: &BTreeMap<ConnectorIndex, Arc<Monitor>>) -> Result<()> {
        if self.is_torn_down() {
            return Err(ViddError::invalid_state("create monitor", "adapter is torn down"));
        }

        let live = monitors
            .values()
            .filter(|m| !m.is_departed())
            .count();
        if live >= self.caps.max_monitors as usize {
            return Err(ViddError::Capacity {
                max: self.caps.max_monitors,
            });
        }
        Ok(())
    }

    fn insert(
        &self,
        monitors: &mut BTreeMap<ConnectorIndex, Arc<Monitor>>,
        connector: ConnectorIndex,
        descriptor: MonitorDescriptor,
    ) -> Arc<Monitor> {
        let monitor = Arc::new(Monitor::new(
            connector,
            descriptor,
            self.processor_config,
            self.sink.clone(),
        ));
        if let Some(previous) = monitors.insert(connector, monitor.clone()) {
            debug!("Connector {} reused (previous monitor {:?})", connector, previous);
        }
        debug!("Monitor {} created", connector);
        monitor
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorIdentity, default_modes};

    fn descriptor() -> MonitorDescriptor {
        MonitorDescriptor::from_identity(&MonitorIdentity::default(), &default_modes()).unwrap()
    }

    #[test]
    fn test_rejects_bad_caps() {
        let caps = AdapterCaps::default().with_max_monitors(0);
        assert!(Adapter::new(DeviceHandle(1), caps).is_err());
    }

    #[test]
    fn test_lowest_free_connector() {
        let adapter = Adapter::new(DeviceHandle(1), AdapterCaps::default().with_max_monitors(3)).unwrap();
        let a = adapter.create_monitor(descriptor()).unwrap();
        let b = adapter.create_monitor(descriptor()).unwrap();
        assert_eq!(a.connector(), ConnectorIndex(0));
        assert_eq!(b.connector(), ConnectorIndex(1));

        a.arrive().unwrap();
        adapter.depart_monitor(ConnectorIndex(0)).unwrap();
        let c = adapter.create_monitor(descriptor()).unwrap();
        assert_eq!(c.connector(), ConnectorIndex(0));
    }

    #[test]
    fn test_connector_in_use() {
        let adapter = Adapter::new(DeviceHandle(1), AdapterCaps::default().with_max_monitors(2)).unwrap();
        adapter.create_monitor_at(ConnectorIndex(1), descriptor()).unwrap();
        let err = adapter
            .create_monitor_at(ConnectorIndex(1), descriptor())
            .unwrap_err();
        assert!(matches!(err, ViddError::ConnectorInUse(ConnectorIndex(1))));
        assert!(adapter.create_monitor_at(ConnectorIndex(2), descriptor()).is_err());
    }

    #[test]
    fn test_full_adapter_reports_capacity_first() {
        let adapter = Adapter::new(DeviceHandle(1), AdapterCaps::default().with_max_monitors(1)).unwrap();
        let first = adapter.create_monitor_at(ConnectorIndex(0), descriptor()).unwrap();

        for connector in [ConnectorIndex(0), ConnectorIndex(1), ConnectorIndex(9)] {
            let err = adapter.create_monitor_at(connector, descriptor()).unwrap_err();
            assert!(matches!(err, ViddError::Capacity { max: 1 }), "{}: {:?}", connector, err);
        }

        assert_eq!(adapter.monitor_count(), 1);
        assert!(Arc::ptr_eq(&adapter.monitor(ConnectorIndex(0)).unwrap(), &first));
        assert!(adapter.monitor(ConnectorIndex(1)).is_none());
    }
}
