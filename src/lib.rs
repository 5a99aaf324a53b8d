// ABOUTME: modemd library: drives 3G USB modems over AT commands and exposes them on D-Bus
// ABOUTME: The binary wires config, plugins and the D-Bus surface around the device manager

pub mod config;
pub mod connection;
pub mod customizer;
pub mod daemon;
pub mod datatypes;
pub mod dbus;
pub mod device;
pub mod encoding;
pub mod error;
pub mod machines;
pub mod mal;
pub mod manager;
pub mod mms;
pub mod pdu;
pub mod plugin;
pub mod port;
pub mod protocol;
pub mod signals;
pub mod sim;
pub mod sms;
pub mod status;
pub mod wrapper;

#[cfg(test)]
mod tests;

pub use device::Device;
pub use error::{ModemError, ModemResult};
pub use manager::{Manager, ManagerEvent};
pub use signals::Signal;
pub use wrapper::Wrapper;
