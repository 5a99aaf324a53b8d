// ABOUTME: Shared per-device status: modem state, cached D-Bus properties and the signal broadcast
// ABOUTME: Wrapper, daemons and the D-Bus layer all read and update the device through this board

use crate::datatypes::{Interface, ModemState};
use crate::signals::Signal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Signals buffered per subscriber before the slowest one starts lagging.
const SIGNAL_CAPACITY: usize = 256;

/// Value of a cached property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropValue {
    Str(String),
    U32(u32),
    Bool(bool),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropValue::U32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

impl From<u32> for PropValue {
    fn from(n: u32) -> Self {
        PropValue::U32(n)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{:?}", s),
            PropValue::U32(n) => write!(f, "{}", n),
            PropValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

pub struct StatusBoard {
    state: Mutex<ModemState>,
    props: Mutex<HashMap<Interface, BTreeMap<String, PropValue>>>,
    signals: broadcast::Sender<Signal>,
}

impl StatusBoard {
    pub fn new() -> StatusBoard {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        StatusBoard {
            state: Mutex::new(ModemState::Disabled),
            props: Mutex::new(HashMap::new()),
            signals,
        }
    }

    pub fn status(&self) -> ModemState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `new`, announcing the change. Setting the current state
    /// again is silent.
    pub fn set_status(&self, new: ModemState) {
        let old = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, new)
        };
        if old == new {
            return;
        }
        debug!(%old, %new, "state change");
        self.set_property(Interface::Modem, "State", new as u32);
        self.set_property(Interface::Modem, "Enabled", new.is_enabled());
        self.emit(Signal::StateChanged { old, new });
    }

    pub fn property(&self, interface: Interface, name: &str) -> Option<PropValue> {
        let props = self.props.lock().unwrap_or_else(|e| e.into_inner());
        props.get(&interface).and_then(|map| map.get(name)).cloned()
    }

    /// Cache `value`, emitting `PropertyChanged` when it differs from what
    /// was stored.
    pub fn set_property(&self, interface: Interface, name: &str, value: impl Into<PropValue>) {
        let value = value.into();
        let changed = {
            let mut props = self.props.lock().unwrap_or_else(|e| e.into_inner());
            let map = props.entry(interface).or_default();
            match map.get(name) {
                Some(current) if *current == value => false,
                _ => {
                    debug!(interface = interface.name(), name, %value, "property");
                    map.insert(name.to_string(), value);
                    true
                }
            }
        };
        if changed {
            self.emit(Signal::PropertyChanged {
                interface,
                name: name.to_string(),
            });
        }
    }

    /// Snapshot of every property cached for `interface`.
    pub fn properties(&self, interface: Interface) -> BTreeMap<String, PropValue> {
        let props = self.props.lock().unwrap_or_else(|e| e.into_inner());
        props.get(&interface).cloned().unwrap_or_default()
    }

    /// Broadcast `signal`. Having no subscribers is fine.
    pub fn emit(&self, signal: Signal) {
        let _ = self.signals.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        StatusBoard::new()
    }
}

impl fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBoard")
            .field("state", &self.status())
            .finish()
    }
}
