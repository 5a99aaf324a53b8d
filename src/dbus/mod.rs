// ABOUTME: D-Bus surface of the daemon: one object per device with the ModemManager interfaces
// ABOUTME: Maps modem errors to their stable error names and re-emits device signals on the bus

mod card;
mod contacts;
mod manager;
mod modem;
mod network;
mod simple;
mod sms;
mod ussd;

pub use card::CardIface;
pub use contacts::ContactsIface;
pub use manager::{MANAGER_INTERFACE, MANAGER_PATH, ManagerIface, serve_manager};
pub use modem::ModemIface;
pub use network::NetworkIface;
pub use simple::SimpleIface;
pub use sms::SmsIface;
pub use ussd::UssdIface;

use crate::datatypes::{ErrorKind, Interface};
use crate::error::ModemError;
use crate::signals::Signal;
use crate::status::PropValue;
use crate::wrapper::Wrapper;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::message::Header;
use zbus::names::{BusName, ErrorName};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::Value;
use zbus::{Connection, Message};

pub const SERVICE_NAME: &str = "org.freedesktop.ModemManager";

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Error returned to D-Bus callers under the name of the failure kind.
#[derive(Debug, Error)]
#[error("{name}: {description}")]
pub struct DbusError {
    name: String,
    description: String,
}

impl DbusError {
    /// Bad argument from the caller.
    pub fn input(description: impl Into<String>) -> DbusError {
        DbusError {
            name: ErrorKind::InputValueError.dbus_name(),
            description: description.into(),
        }
    }
}

impl From<ModemError> for DbusError {
    fn from(e: ModemError) -> Self {
        DbusError {
            name: e.dbus_name(),
            description: e.text(),
        }
    }
}

impl From<zbus::Error> for DbusError {
    fn from(e: zbus::Error) -> Self {
        DbusError {
            name: ErrorKind::GenericError.dbus_name(),
            description: e.to_string(),
        }
    }
}

impl zbus::DBusError for DbusError {
    fn create_reply(&self, call: &Header<'_>) -> zbus::Result<Message> {
        Message::error(call, self.name())?.build(&(self.description.as_str(),))
    }

    fn name(&self) -> ErrorName<'_> {
        ErrorName::from_str_unchecked(&self.name)
    }

    fn description(&self) -> Option<&str> {
        Some(&self.description)
    }
}

/// Dictionary entries as clients receive them in `a{sv}` replies.
pub type Dict = HashMap<String, Value<'static>>;

fn prop_value(value: PropValue) -> Value<'static> {
    match value {
        PropValue::Str(s) => Value::from(s),
        PropValue::U32(n) => Value::from(n),
        PropValue::Bool(b) => Value::from(b),
    }
}

fn str_prop(wrapper: &Wrapper, interface: Interface, name: &str) -> String {
    wrapper
        .board()
        .property(interface, name)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn u32_prop(wrapper: &Wrapper, interface: Interface, name: &str) -> u32 {
    wrapper
        .board()
        .property(interface, name)
        .and_then(|v| v.as_u32())
        .unwrap_or_default()
}

fn bool_prop(wrapper: &Wrapper, interface: Interface, name: &str) -> bool {
    wrapper
        .board()
        .property(interface, name)
        .and_then(|v| v.as_bool())
        .unwrap_or_default()
}

/// Register every device interface at `path` and start re-emitting the
/// device's signals there.
pub async fn export_device(
    conn: &Connection,
    path: &str,
    wrapper: Arc<Wrapper>,
) -> zbus::Result<JoinHandle<()>> {
    // subscribe first so nothing emitted during export is lost
    let signals = wrapper.board().subscribe();
    let server = conn.object_server();
    server.at(path, ModemIface::new(wrapper.clone())).await?;
    server.at(path, SimpleIface::new(wrapper.clone())).await?;
    server.at(path, CardIface::new(wrapper.clone())).await?;
    server.at(path, ContactsIface::new(wrapper.clone())).await?;
    server.at(path, NetworkIface::new(wrapper.clone())).await?;
    server.at(path, SmsIface::new(wrapper.clone())).await?;
    server.at(path, UssdIface::new(wrapper.clone())).await?;

    let emitter = SignalEmitter::new(conn, path.to_string())?;
    let task = tokio::spawn(forward_signals(conn.clone(), emitter, wrapper, signals));
    debug!(path, "device exported");
    Ok(task)
}

pub async fn unexport_device(conn: &Connection, path: &str) -> zbus::Result<()> {
    let server = conn.object_server();
    server.remove::<ModemIface, _>(path).await?;
    server.remove::<SimpleIface, _>(path).await?;
    server.remove::<CardIface, _>(path).await?;
    server.remove::<ContactsIface, _>(path).await?;
    server.remove::<NetworkIface, _>(path).await?;
    server.remove::<SmsIface, _>(path).await?;
    server.remove::<UssdIface, _>(path).await?;
    debug!(path, "device unexported");
    Ok(())
}

async fn forward_signals(
    conn: Connection,
    emitter: SignalEmitter<'static>,
    wrapper: Arc<Wrapper>,
    mut signals: tokio::sync::broadcast::Receiver<Signal>,
) {
    loop {
        let signal = match signals.recv().await {
            Ok(signal) => signal,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "signal forwarder fell behind");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let name = signal.name();
        if let Err(e) = emit(&conn, &emitter, &wrapper, signal).await {
            warn!(signal = name, error = %e, "could not emit signal");
        }
    }
}

async fn emit(
    conn: &Connection,
    emitter: &SignalEmitter<'static>,
    wrapper: &Wrapper,
    signal: Signal,
) -> zbus::Result<()> {
    match signal {
        Signal::SignalQuality(quality) => NetworkIface::signal_quality(emitter, quality).await,
        Signal::NetworkMode(mode) => NetworkIface::network_mode(emitter, mode as u32).await,
        Signal::RegistrationInfo(info) => {
            NetworkIface::registration_info(
                emitter,
                info.status as u32,
                &info.operator_code,
                &info.operator_name,
            )
            .await
        }
        Signal::SmsReceived { index, completed } => {
            SmsIface::sms_received(emitter, index, completed).await
        }
        Signal::Completed(index) => SmsIface::completed(emitter, index, true).await,
        Signal::Delivered(reference) => SmsIface::delivered(emitter, reference).await,
        Signal::MmsReceived { index, headers } => {
            let headers: HashMap<String, Value<'static>> = headers
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect();
            SmsIface::mms_received(emitter, index, headers).await
        }
        Signal::StateChanged { old, new } => {
            ModemIface::modem_state_changed(emitter, old as u32, new as u32, 0).await
        }
        Signal::PropertyChanged { interface, name } => {
            let Some(value) = wrapper.board().property(interface, &name) else {
                return Ok(());
            };
            let changed: HashMap<&str, Value<'_>> =
                HashMap::from([(name.as_str(), prop_value(value))]);
            conn.emit_signal(
                None::<BusName<'_>>,
                emitter.path().clone(),
                PROPERTIES_INTERFACE,
                "PropertiesChanged",
                &(interface.name(), changed, Vec::<&str>::new()),
            )
            .await
        }
        // internal signals with no D-Bus counterpart
        Signal::CregReceived(_)
        | Signal::CallReceived
        | Signal::Connected
        | Signal::Disconnected
        | Signal::DialStats { .. } => Ok(()),
    }
}

/// Read a string entry of an `a{sv}` argument.
fn dict_str<'a>(dict: &'a HashMap<String, zbus::zvariant::OwnedValue>, key: &str) -> Option<&'a str> {
    match dict.get(key).map(|v| &**v) {
        Some(Value::Str(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn dict_u32(dict: &HashMap<String, zbus::zvariant::OwnedValue>, key: &str) -> Option<u32> {
    match dict.get(key).map(|v| &**v) {
        Some(Value::U32(n)) => Some(*n),
        Some(Value::I32(n)) => u32::try_from(*n).ok(),
        _ => None,
    }
}

fn dict_bool(dict: &HashMap<String, zbus::zvariant::OwnedValue>, key: &str) -> Option<bool> {
    match dict.get(key).map(|v| &**v) {
        Some(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::OwnedValue;

    #[test]
    fn test_error_names() {
        let err = DbusError::from(ModemError::new(ErrorKind::SimPinRequired, "+CPIN: SIM PIN"));
        assert_eq!(
            zbus::DBusError::name(&err).as_str(),
            "org.freedesktop.ModemManager.Modem.Gsm.SimPinRequired"
        );
        assert_eq!(zbus::DBusError::description(&err), Some("+CPIN: SIM PIN"));

        let err = DbusError::from(ModemError::PortClosed);
        assert_eq!(
            zbus::DBusError::name(&err).as_str(),
            "org.freedesktop.ModemManager.Error"
        );
        let err = DbusError::input("bad charset");
        assert_eq!(
            zbus::DBusError::name(&err).as_str(),
            ErrorKind::InputValueError.dbus_name()
        );
    }

    #[test]
    fn test_dict_accessors() {
        let owned = |v: Value<'_>| -> OwnedValue { v.try_to_owned().unwrap() };
        let mut dict = HashMap::new();
        dict.insert("apn".to_string(), owned(Value::from("internet")));
        dict.insert("band".to_string(), owned(Value::from(0x80u32)));
        dict.insert("status_request".to_string(), owned(Value::from(true)));
        assert_eq!(dict_str(&dict, "apn"), Some("internet"));
        assert_eq!(dict_u32(&dict, "band"), Some(0x80));
        assert_eq!(dict_bool(&dict, "status_request"), Some(true));
        assert_eq!(dict_str(&dict, "band"), None);
        assert_eq!(dict_u32(&dict, "missing"), None);
    }

    #[test]
    fn test_prop_values() {
        assert_eq!(prop_value(PropValue::U32(40)), Value::from(40u32));
        assert_eq!(prop_value(PropValue::Str("sim-pin".into())), Value::from("sim-pin"));
    }
}
