// ABOUTME: One attached modem: its plugin, ports, AT engine, wrapper and the task feeding notifications back
// ABOUTME: Discovery probes the announced ports, identifies the model and settles on a plugin

use crate::config::DeviceConfig;
use crate::customizer::Family;
use crate::daemon::PollIntervals;
use crate::datatypes::{Interface, ModemState};
use crate::error::{ModemError, ModemResult};
use crate::plugin::{self, Plugin, Registry};
use crate::port::{DEFAULT_BAUDRATE, PortPair, open_serial};
use crate::protocol::{Engine, Unsolicited};
use crate::status::StatusBoard;
use crate::wrapper::{DataLink, Wrapper};
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `Type` property value for GSM devices.
const MODEM_TYPE_GSM: u32 = 1;

#[derive(Debug)]
pub struct Device {
    udi: String,
    plugin: Plugin,
    ports: PortPair,
    wrapper: Arc<Wrapper>,
    events: JoinHandle<()>,
}

impl Device {
    /// Probe the ports of a device announced by discovery and attach to it.
    pub async fn discover(
        registry: &Registry,
        config: &DeviceConfig,
        intervals: PollIntervals,
    ) -> ModemResult<Device> {
        let candidate = match &config.plugin {
            Some(name) => Some(registry.find_by_name(name).ok_or_else(|| {
                ModemError::InvalidState(format!("no plugin named {}", name))
            })?),
            None => registry.find_by_ids(config.vendor_id, config.product_id),
        };
        let baudrate = candidate
            .map(|p| p.baudrate)
            .unwrap_or(DEFAULT_BAUDRATE);
        debug!(
            udi = config.udi.as_str(),
            plugin = candidate.map(|p| p.name),
            "probing device"
        );

        let ports = plugin::probe_ports(
            &config.ports,
            candidate.and_then(|p| p.hardcoded_ports),
            |path: &Path| {
                let stream = open_serial(path, baudrate);
                async move {
                    match stream {
                        Ok(mut stream) => plugin::probe_port(&mut stream).await,
                        Err(_) => false,
                    }
                }
            },
        )
        .await?;

        let mut stream = open_serial(ports.at_port()?, baudrate)?;
        let plugin = match plugin::identify(&mut stream).await {
            Ok(model) => registry.refine(candidate, &model),
            Err(e) => {
                warn!(udi = config.udi.as_str(), error = %e, "could not identify model");
                candidate.cloned()
            }
        }
        .unwrap_or_else(|| {
            Plugin::new("Generic", Family::Generic).ids(config.vendor_id, &[config.product_id])
        });

        Device::attach(&config.udi, plugin, ports, stream, intervals)
    }

    /// Start an engine on `stream`, the already opened AT port of `ports`.
    pub fn attach<S>(
        udi: &str,
        plugin: Plugin,
        ports: PortPair,
        stream: S,
        intervals: PollIntervals,
    ) -> ModemResult<Device>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let custom = Arc::new(plugin.customizer()?);
        let (engine, events) = Engine::spawn(stream, custom.clone())?;
        let link = match (&ports.data, ports.has_dedicated_data_port()) {
            (Some(path), true) => DataLink::Dedicated {
                path: path.clone(),
                baudrate: plugin.baudrate,
            },
            _ => DataLink::Shared,
        };

        let board = Arc::new(StatusBoard::new());
        let device_path = ports
            .data
            .as_deref()
            .or(ports.control.as_deref())
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        board.set_property(Interface::Modem, "Device", device_path);
        board.set_property(Interface::Modem, "Driver", custom.family());
        board.set_property(Interface::Modem, "Type", MODEM_TYPE_GSM);
        board.set_property(Interface::Modem, "IpMethod", custom.ip_method() as u32);
        board.set_property(Interface::Modem, "UnlockRequired", "");
        board.set_property(Interface::Modem, "Enabled", false);
        board.set_property(Interface::Modem, "State", ModemState::Disabled as u32);

        let wrapper =
            Arc::new(Wrapper::new(engine, custom, board, link).with_intervals(intervals));
        let events = tokio::spawn(forward_events(Arc::downgrade(&wrapper), events));

        info!(udi, plugin = plugin.name, %ports, "device attached");
        Ok(Device {
            udi: udi.to_string(),
            plugin,
            ports,
            wrapper,
            events,
        })
    }

    pub fn udi(&self) -> &str {
        &self.udi
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    pub fn ports(&self) -> &PortPair {
        &self.ports
    }

    pub fn wrapper(&self) -> &Arc<Wrapper> {
        &self.wrapper
    }

    pub fn board(&self) -> &StatusBoard {
        self.wrapper.board()
    }

    /// Disable the device and stop its engine.
    pub async fn close(self) {
        if let Err(e) = self.wrapper.disable_device().await {
            warn!(udi = self.udi.as_str(), error = %e, "disable on removal failed");
        }
        self.wrapper.engine().close();
        if let Err(e) = self.events.await {
            debug!(error = %e, "event task ended abnormally");
        }
        info!(udi = self.udi.as_str(), "device closed");
    }
}

/// Feed engine notifications to the wrapper until the engine stops or the
/// device goes away.
async fn forward_events(wrapper: Weak<Wrapper>, mut events: mpsc::UnboundedReceiver<Unsolicited>) {
    while let Some(event) = events.recv().await {
        let Some(wrapper) = wrapper.upgrade() else {
            return;
        };
        wrapper.handle_unsolicited(event).await;
    }
    debug!("engine events closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::IpMethod;
    use crate::signals::Signal;
    use crate::wrapper::testing::mock_modem;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn option_hso() -> Plugin {
        Registry::builtin().find_by_ids(0x0af0, 0x7211).unwrap().clone()
    }

    #[tokio::test]
    async fn test_attach_publishes_initial_properties() {
        let (stream, _) = mock_modem(vec![]);
        let ports = PortPair::new(Some("/dev/ttyHS0".into()), Some("/dev/ttyHS1".into()));
        let device = Device::attach("/sys/usb1/1-1", option_hso(), ports, stream, PollIntervals::default())
            .unwrap();

        let props = device.board().properties(Interface::Modem);
        assert_eq!(props["Device"].as_str(), Some("/dev/ttyHS0"));
        assert_eq!(props["Driver"].as_str(), Some(device.wrapper().custom().family()));
        assert_eq!(props["Type"].as_u32(), Some(1));
        assert_eq!(props["IpMethod"].as_u32(), Some(IpMethod::Static as u32));
        assert_eq!(props["Enabled"].as_bool(), Some(false));
        assert_eq!(props["State"].as_u32(), Some(ModemState::Disabled as u32));
        assert_eq!(device.udi(), "/sys/usb1/1-1");
        device.close().await;
    }

    #[tokio::test]
    async fn test_notifications_reach_the_wrapper() {
        let (ours, mut modem) = tokio::io::duplex(1024);
        let device = Device::attach(
            "udi",
            Plugin::new("Generic", Family::Generic),
            PortPair::single("/dev/ttyACM0"),
            ours,
            PollIntervals::default(),
        )
        .unwrap();
        let mut rx = device.board().subscribe();

        modem.write_all(b"\r\n+CREG: 1\r\n").await.unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(Signal::CregReceived(status)) => return status,
                    Ok(_) => {}
                    Err(e) => panic!("board closed: {}", e),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(signal, 1);
        device.close().await;
    }
}
