// ABOUTME: Set of attached devices keyed by udi, each exported under its own object path
// ABOUTME: Additions and removals are broadcast so the D-Bus layer can announce them

use crate::config::DeviceConfig;
use crate::daemon::PollIntervals;
use crate::device::Device;
use crate::error::ModemResult;
use crate::plugin::Registry;
use crate::wrapper::Wrapper;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, broadcast};
use tracing::info;

pub const DEVICES_PATH: &str = "/org/freedesktop/ModemManager/Devices";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Object path of the new device
    DeviceAdded(String),
    DeviceRemoved(String),
}

struct Entry {
    path: String,
    device: Device,
}

pub struct Manager {
    registry: Registry,
    intervals: PollIntervals,
    devices: Mutex<BTreeMap<String, Entry>>,
    next_index: AtomicU32,
    events: broadcast::Sender<ManagerEvent>,
}

impl Manager {
    pub fn new(registry: Registry, intervals: PollIntervals) -> Manager {
        let (events, _) = broadcast::channel(16);
        Manager {
            registry,
            intervals,
            devices: Mutex::new(BTreeMap::new()),
            next_index: AtomicU32::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Discover the device described by `config` and add it.
    pub async fn device_added(&self, config: &DeviceConfig) -> ModemResult<(String, Arc<Wrapper>)> {
        let device = Device::discover(&self.registry, config, self.intervals).await?;
        Ok(self.insert(device).await)
    }

    /// Add an already attached device, replacing one with the same udi.
    pub async fn insert(&self, device: Device) -> (String, Arc<Wrapper>) {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let path = format!("{}/{}", DEVICES_PATH, index);
        let wrapper = device.wrapper().clone();
        let udi = device.udi().to_string();

        let previous = self.devices.lock().await.insert(
            udi.clone(),
            Entry {
                path: path.clone(),
                device,
            },
        );
        if let Some(previous) = previous {
            let _ = self.events.send(ManagerEvent::DeviceRemoved(previous.path));
            previous.device.close().await;
        }
        info!(udi, path, "device added");
        let _ = self.events.send(ManagerEvent::DeviceAdded(path.clone()));
        (path, wrapper)
    }

    /// Close and forget the device known as `udi`, returning its path.
    pub async fn device_removed(&self, udi: &str) -> Option<String> {
        let entry = self.devices.lock().await.remove(udi)?;
        info!(udi, path = entry.path.as_str(), "device removed");
        let _ = self.events.send(ManagerEvent::DeviceRemoved(entry.path.clone()));
        entry.device.close().await;
        Some(entry.path)
    }

    /// Object paths of every attached device.
    pub async fn device_paths(&self) -> Vec<String> {
        self.devices
            .lock()
            .await
            .values()
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Wrapper of the device exported at `path`.
    pub async fn wrapper(&self, path: &str) -> Option<Arc<Wrapper>> {
        self.devices
            .lock()
            .await
            .values()
            .find(|entry| entry.path == path)
            .map(|entry| entry.device.wrapper().clone())
    }

    pub async fn udis(&self) -> Vec<String> {
        self.devices.lock().await.keys().cloned().collect()
    }

    /// Close every device, as on shutdown.
    pub async fn close_all(&self) {
        let entries = std::mem::take(&mut *self.devices.lock().await);
        for (_, entry) in entries {
            entry.device.close().await;
        }
    }
}
