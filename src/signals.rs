// ABOUTME: Signals a modem emits towards clients, from unsolicited notifications or state changes
// ABOUTME: Devices broadcast these and the D-Bus layer re-emits them on the matching interface

use crate::datatypes::{Interface, ModemState, NetworkMode, RegistrationInfo};
use std::collections::BTreeMap;

/// Header map of an MMS notification as exported to clients.
pub type MmsHeaders = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Signal quality, 0-100
    SignalQuality(u32),
    NetworkMode(NetworkMode),
    RegistrationInfo(RegistrationInfo),
    /// Raw `+CREG: <status>` notification
    CregReceived(u32),
    CallReceived,
    SmsReceived { index: u32, completed: bool },
    Completed(u32),
    Delivered(u32),
    MmsReceived { index: u32, headers: MmsHeaders },
    Connected,
    Disconnected,
    /// Link speed reported during a data call, bits per second
    DialStats { rx_bps: u64, tx_bps: u64 },
    StateChanged { old: ModemState, new: ModemState },
    /// A property on `interface` changed value
    PropertyChanged { interface: Interface, name: String },
}

impl Signal {
    /// D-Bus member name the signal is emitted under.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::SignalQuality(_) => "SignalQuality",
            Signal::NetworkMode(_) => "NetworkMode",
            Signal::RegistrationInfo(_) => "RegistrationInfo",
            Signal::CregReceived(_) => "CregReceived",
            Signal::CallReceived => "CallReceived",
            Signal::SmsReceived { .. } => "SmsReceived",
            Signal::Completed(_) => "Completed",
            Signal::Delivered(_) => "Delivered",
            Signal::MmsReceived { .. } => "MmsReceived",
            Signal::Connected => "Connected",
            Signal::Disconnected => "Disconnected",
            Signal::DialStats { .. } => "DialStats",
            Signal::StateChanged { .. } => "StateChanged",
            Signal::PropertyChanged { .. } => "PropertiesChanged",
        }
    }
}

/// Signals a device family emits on its own, so the daemon collection
/// knows what it does not need to poll.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    SignalQuality,
    NetworkMode,
    /// New SMS are announced while the device is online
    SmsNotifyOnline,
    Speed,
}
