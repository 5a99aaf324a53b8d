// ABOUTME: The serial devices a modem exposes: an optional data port and an optional control port
// ABOUTME: AT traffic goes to the control port when there is one; data calls take the data port

use crate::error::{ModemError, ModemResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Baud rate used when a plugin does not ask for another one.
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Data and control ports of one modem.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortPair {
    pub data: Option<PathBuf>,
    pub control: Option<PathBuf>,
}

impl PortPair {
    pub fn new(data: Option<PathBuf>, control: Option<PathBuf>) -> PortPair {
        PortPair { data, control }
    }

    /// A modem with a single port carrying both AT traffic and data.
    pub fn single(path: impl Into<PathBuf>) -> PortPair {
        PortPair {
            data: Some(path.into()),
            control: None,
        }
    }

    /// Port the AT engine talks to.
    pub fn at_port(&self) -> ModemResult<&Path> {
        self.control
            .as_deref()
            .or(self.data.as_deref())
            .ok_or_else(|| ModemError::InvalidState("modem has no ports".to_string()))
    }

    /// Whether data calls get a port of their own.
    pub fn has_dedicated_data_port(&self) -> bool {
        self.data.is_some() && self.control.is_some()
    }
}

impl fmt::Display for PortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        write!(f, "data: {} control: {}", show(&self.data), show(&self.control))
    }
}

/// Open `path` at `baudrate` as an async serial stream.
pub fn open_serial(path: &Path, baudrate: u32) -> ModemResult<SerialStream> {
    let path = path
        .to_str()
        .ok_or_else(|| ModemError::InvalidData(format!("bad port path {}", path.display())))?;
    let stream = tokio_serial::new(path, baudrate)
        .timeout(Duration::from_millis(500))
        .open_native_async()?;
    Ok(stream)
}
