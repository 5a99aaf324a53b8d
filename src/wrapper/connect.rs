// ABOUTME: Data calls: dialing over a serial port or NDIS activation, teardown and IP configuration
// ABOUTME: Also the simple interface: one-shot connect and a status snapshot for connection managers

use super::Wrapper;
use crate::datatypes::{Band, ErrorKind, IpMethod, ModemState, NetworkMode};
use crate::error::{ModemError, ModemResult};
use crate::machines::{self, SimpleSettings};
use crate::port::open_serial;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

/// How long DTR stays low when hanging up a dialed call.
const DTR_DROP: Duration = Duration::from_millis(100);

/// Guard time around the `+++` escape sequence.
const ESCAPE_GUARD: Duration = Duration::from_secs(1);

/// IP configuration polls before an NDIS call is given up.
const IP_RETRIES: u32 = 10;
const IP_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Where a dialed data call runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataLink {
    /// The AT port doubles as data port; it switches to data mode while
    /// the call is up
    Shared,
    /// A port of its own, opened when dialing
    Dedicated { path: PathBuf, baudrate: u32 },
}

impl DataLink {
    pub fn is_dedicated(&self) -> bool {
        matches!(self, DataLink::Dedicated { .. })
    }
}

/// Snapshot returned by the simple interface's `GetStatus`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimpleStatus {
    pub state: ModemState,
    /// Only filled in once the device is enabled
    pub registered: Option<RegisteredStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredStatus {
    pub signal_quality: u32,
    pub operator_code: String,
    pub operator_name: String,
    pub band: Band,
    pub network_mode: NetworkMode,
}

impl Wrapper {
    fn check_can_connect(&self) -> ModemResult<()> {
        match self.status() {
            ModemState::Connected => Err(ModemError::new(ErrorKind::Connected, "already connected")),
            ModemState::Connecting => Err(ModemError::new(ErrorKind::SimBusy, "already connecting")),
            _ => Ok(()),
        }
    }

    /// Put the device back to registered after a call went away.
    pub(crate) fn rewind_to_registered(&self) {
        if self.status() > ModemState::Registered {
            self.set_status(ModemState::Registered);
        }
    }

    /// Start a data call. Dialing families write `ATDT<number>` and leave
    /// the link to the dialer; NDIS families activate the selected context.
    pub async fn connect_to_internet(&self, number: &str) -> ModemResult<()> {
        self.check_can_connect()?;
        {
            let mut session = self.session();
            session.connection_failed = false;
            session.should_stop = false;
        }
        self.set_status(ModemState::Connecting);

        let result = match self.custom.hooks().connect {
            Some(connect) => connect(self).await,
            None => self.dial(number).await,
        };
        if let Err(e) = &result {
            warn!(error = %e, "data call failed to start");
            self.rewind_to_registered();
        }
        result
    }

    async fn dial(&self, number: &str) -> ModemResult<()> {
        let atdt = format!("ATDT{}\r\n", number);
        match &self.link {
            DataLink::Dedicated { path, baudrate } => {
                let mut port = open_serial(path, *baudrate)?;
                port.write_all(atdt.as_bytes()).await?;
                port.flush().await?;
                *self.dialer.lock().await = Some(port);
                info!(port = %path.display(), "dialed on data port");
            }
            DataLink::Shared => {
                self.engine.write_raw(atdt).await?;
                self.engine.set_data_mode(true);
                info!("dialed on shared port");
            }
        }
        Ok(())
    }

    /// Tear the data call down. Nothing to do while no call is up.
    pub async fn disconnect_from_internet(&self) -> ModemResult<()> {
        match self.status() {
            ModemState::Connected => {}
            ModemState::Connecting => self.session().should_stop = true,
            _ => return Ok(()),
        }
        self.set_status(ModemState::Disconnecting);

        let result = match self.custom.hooks().disconnect {
            Some(disconnect) => disconnect(self).await,
            None => self.hang_up().await,
        };
        self.rewind_to_registered();
        result
    }

    async fn hang_up(&self) -> ModemResult<()> {
        if let Some(mut port) = self.dialer.lock().await.take() {
            // Dropping the speed to zero lowers DTR
            let speed = port.baud_rate()?;
            if let Err(e) = port.set_baud_rate(0) {
                debug!(error = %e, "port refused baud rate 0");
            }
            sleep(DTR_DROP).await;
            if let Err(e) = port.set_baud_rate(speed) {
                debug!(error = %e, "could not restore baud rate");
            }
            info!("data port closed");
            return Ok(());
        }
        if self.engine.is_data_mode() {
            sleep(ESCAPE_GUARD).await;
            self.engine.write_raw("+++").await?;
            sleep(ESCAPE_GUARD).await;
            self.engine.set_data_mode(false);
            self.send_at("ATH").await?;
            info!("shared port back in command mode");
        }
        Ok(())
    }

    /// `[ip, dns1, dns2, dns3]` of an NDIS call, polled until the modem
    /// hands one out. The device is connected once it does.
    pub async fn get_ip4_config(&self) -> ModemResult<Vec<String>> {
        let Some(fetch) = self.custom.hooks().get_ip4_config else {
            return Err(ModemError::new(
                ErrorKind::OperationNotSupported,
                "IP configuration is only known to NDIS devices",
            ));
        };
        if self.custom.ip_method() != IpMethod::Static {
            return Err(ModemError::new(
                ErrorKind::OperationNotSupported,
                "cannot get IP4 config from a non static ip method",
            ));
        }

        let mut retries = 0;
        loop {
            if self.connection_failed() {
                self.rewind_to_registered();
                return Err(ModemError::new(ErrorKind::General, "connection attempt failed"));
            }
            match fetch(self).await {
                Ok(config) => {
                    self.set_status(ModemState::Connected);
                    return Ok(config);
                }
                Err(e) if e.is(ErrorKind::General) || e.is(ErrorKind::OperationNotSupported) => {
                    if self.take_should_stop() {
                        return Err(ModemError::Cancelled);
                    }
                    retries += 1;
                    if retries > IP_RETRIES {
                        self.rewind_to_registered();
                        return Err(e);
                    }
                    debug!(retries, "no IP configuration yet");
                    sleep(IP_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the whole connect sequence from `settings`: unlock, register,
    /// program APN, band and mode, then start the call.
    pub async fn connect_simple(&self, settings: SimpleSettings) -> ModemResult<()> {
        self.check_can_connect()?;
        match machines::connect_simple(self, settings).await {
            Ok(()) => {
                self.set_status(ModemState::Connected);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "simple connect failed");
                if self.status() >= ModemState::Registered {
                    self.set_status(ModemState::Registered);
                }
                Err(e)
            }
        }
    }

    pub async fn get_simple_status(&self) -> ModemResult<SimpleStatus> {
        let state = self.status();
        if state < ModemState::Enabled {
            return Ok(SimpleStatus {
                state,
                registered: None,
            });
        }
        let signal_quality = self.get_signal_quality().await?;
        let info = self.get_netreg_info().await?;
        let band = self.get_band().await?;
        let network_mode = self.get_network_mode().await?;
        Ok(SimpleStatus {
            state: self.status(),
            registered: Some(RegisteredStatus {
                signal_quality,
                operator_code: info.operator_code,
                operator_name: info.operator_name,
                band,
                network_mode,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_while_busy() {
        let (wrapper, _) = scripted(vec![]);
        wrapper.set_status(ModemState::Connected);
        let err = wrapper.connect_to_internet("*99#").await.unwrap_err();
        assert!(err.is(ErrorKind::Connected));

        wrapper.set_status(ModemState::Connecting);
        let err = wrapper.connect_to_internet("*99#").await.unwrap_err();
        assert!(err.is(ErrorKind::SimBusy));
    }

    #[tokio::test]
    async fn test_shared_port_dial_and_hang_up() {
        let (wrapper, mut seen) = scripted(vec![]);
        wrapper.set_status(ModemState::Registered);
        wrapper.connect_to_internet("*99***1#").await.unwrap();
        assert_eq!(wrapper.status(), ModemState::Connecting);
        assert!(wrapper.engine().is_data_mode());
        assert_eq!(drain(&mut seen), vec!["ATDT*99***1#"]);

        wrapper.set_status(ModemState::Connected);
        tokio::time::pause();
        wrapper.disconnect_from_internet().await.unwrap();
        assert!(!wrapper.engine().is_data_mode());
        assert_eq!(wrapper.status(), ModemState::Registered);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_a_no_op() {
        let (wrapper, mut seen) = scripted(vec![]);
        wrapper.set_status(ModemState::Registered);
        wrapper.disconnect_from_internet().await.unwrap();
        assert_eq!(wrapper.status(), ModemState::Registered);
        assert!(drain(&mut seen).is_empty());
    }

    #[tokio::test]
    async fn test_ip4_config_needs_ndis() {
        let (wrapper, _) = scripted(vec![]);
        let err = wrapper.get_ip4_config().await.unwrap_err();
        assert!(err.is(ErrorKind::OperationNotSupported));
    }

    #[tokio::test]
    async fn test_simple_status_below_enabled() {
        let (wrapper, mut seen) = scripted(vec![]);
        let status = wrapper.get_simple_status().await.unwrap();
        assert_eq!(status.state, ModemState::Disabled);
        assert!(status.registered.is_none());
        assert!(drain(&mut seen).is_empty());
    }

    #[tokio::test]
    async fn test_simple_status_when_registered() {
        let (wrapper, _) = scripted(vec![
            ("AT+CSQ", "\r\n+CSQ: 20,99\r\n\r\nOK\r\n".into()),
            ("AT+CREG?", "\r\n+CREG: 1,1\r\n\r\nOK\r\n".into()),
            ("AT+COPS?", "\r\n+COPS: 0,2,\"21401\",2\r\n\r\nOK\r\n".into()),
        ]);
        wrapper.set_status(ModemState::Registered);
        let status = wrapper.get_simple_status().await.unwrap();
        let registered = status.registered.unwrap();
        assert_eq!(registered.signal_quality, 64);
        assert_eq!(registered.operator_code, "21401");
        assert_eq!(registered.band, Band::ANY);
        assert_eq!(registered.network_mode, NetworkMode::Any);
    }
}
