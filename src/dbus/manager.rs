// ABOUTME: org.freedesktop.ModemManager root object: enumerates devices and announces hotplug
// ABOUTME: Follows manager events to export and unexport the per-device objects

use super::{export_device, unexport_device};
use crate::manager::{Manager, ManagerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};
use zbus::{Connection, interface};

pub const MANAGER_PATH: &str = "/org/freedesktop/ModemManager";
pub const MANAGER_INTERFACE: &str = "org.freedesktop.ModemManager";

pub struct ManagerIface {
    manager: Arc<Manager>,
}

#[interface(name = "org.freedesktop.ModemManager")]
impl ManagerIface {
    async fn enumerate_devices(&self) -> Vec<OwnedObjectPath> {
        self.manager
            .device_paths()
            .await
            .into_iter()
            .filter_map(|path| OwnedObjectPath::try_from(path).ok())
            .collect()
    }

    #[zbus(signal)]
    pub async fn device_added(emitter: &SignalEmitter<'_>, device: ObjectPath<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn device_removed(emitter: &SignalEmitter<'_>, device: ObjectPath<'_>) -> zbus::Result<()>;
}

/// Export the manager object and keep the device objects in step with
/// `manager` until it goes away.
pub async fn serve_manager(conn: &Connection, manager: Arc<Manager>) -> zbus::Result<JoinHandle<()>> {
    let events = manager.subscribe();
    conn.object_server()
        .at(MANAGER_PATH, ManagerIface {
            manager: manager.clone(),
        })
        .await?;
    let emitter = SignalEmitter::new(conn, MANAGER_PATH)?;
    info!(path = MANAGER_PATH, "manager exported");
    Ok(tokio::spawn(follow_devices(conn.clone(), emitter, manager, events)))
}

async fn follow_devices(
    conn: Connection,
    emitter: SignalEmitter<'static>,
    manager: Arc<Manager>,
    mut events: tokio::sync::broadcast::Receiver<ManagerEvent>,
) {
    let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "device event listener fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ManagerEvent::DeviceAdded(path) => {
                // replaced before we got to it
                let Some(wrapper) = manager.wrapper(&path).await else {
                    continue;
                };
                match export_device(&conn, &path, wrapper).await {
                    Ok(task) => {
                        forwarders.insert(path.clone(), task);
                    }
                    Err(e) => {
                        warn!(path, error = %e, "could not export device");
                        continue;
                    }
                }
                if let Err(e) = announce(&emitter, &path, true).await {
                    warn!(path, error = %e, "could not emit DeviceAdded");
                }
            }
            ManagerEvent::DeviceRemoved(path) => {
                let Some(task) = forwarders.remove(&path) else {
                    continue;
                };
                task.abort();
                if let Err(e) = unexport_device(&conn, &path).await {
                    warn!(path, error = %e, "could not unexport device");
                }
                if let Err(e) = announce(&emitter, &path, false).await {
                    warn!(path, error = %e, "could not emit DeviceRemoved");
                }
            }
        }
    }
    for (_, task) in forwarders {
        task.abort();
    }
}

async fn announce(emitter: &SignalEmitter<'_>, path: &str, added: bool) -> zbus::Result<()> {
    let path = ObjectPath::try_from(path)?;
    if added {
        ManagerIface::device_added(emitter, path).await
    } else {
        ManagerIface::device_removed(emitter, path).await
    }
}
