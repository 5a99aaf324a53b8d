// ABOUTME: Modem error type shared by the engine, wrapper, message layer and D-Bus surface
// ABOUTME: Provides structured error reporting with automatic conversion from I/O and serial errors

use crate::datatypes::ErrorKind;
use std::io;
use thiserror::Error;

/// Comprehensive error type for modem operations
///
/// Failures reported by the modem itself (or raised by the wrapper on its
/// behalf) carry an [`ErrorKind`] plus the textual fragment that produced
/// them. The remaining variants cover transport and programming errors.
#[derive(Debug, Error)]
pub enum ModemError {
    /// Failure with a stable kind and the raw text that triggered it
    #[error("{kind}: {text}")]
    Modem { kind: ErrorKind, text: String },

    /// I/O error on a serial port or socket
    #[error("Connection error: {0}")]
    Io(#[from] io::Error),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// A response or notification pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Queued command removed before it was written
    #[error("Command cancelled")]
    Cancelled,

    /// The engine owning the port has shut down
    #[error("Port closed")]
    PortClosed,

    /// AT traffic attempted while the port carries a data call
    #[error("Port is in data mode")]
    DataMode,

    /// Operation not valid in the current device state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed reply, PDU or argument
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for modem operations
pub type ModemResult<T> = Result<T, ModemError>;

impl ModemError {
    pub fn new(kind: ErrorKind, text: impl Into<String>) -> Self {
        ModemError::Modem {
            kind,
            text: text.into(),
        }
    }

    /// Kind of a modem-reported failure, `None` for transport errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ModemError::Modem { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_some_and(|k| k.is_transient())
    }

    /// D-Bus error name this error is exported under.
    pub fn dbus_name(&self) -> String {
        match self {
            ModemError::Modem { kind, .. } => kind.dbus_name(),
            ModemError::InvalidData(_) => ErrorKind::InputValueError.dbus_name(),
            ModemError::DataMode => ErrorKind::Connected.dbus_name(),
            _ => ErrorKind::GenericError.dbus_name(),
        }
    }

    /// Text attached to the error, without the kind prefix.
    pub fn text(&self) -> String {
        match self {
            ModemError::Modem { text, .. } => text.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ErrorKind> for ModemError {
    fn from(kind: ErrorKind) -> Self {
        ModemError::new(kind, kind.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_accessors() {
        let err = ModemError::new(ErrorKind::SimBusy, "+CME ERROR: 14");
        assert_eq!(err.kind(), Some(ErrorKind::SimBusy));
        assert!(err.is(ErrorKind::SimBusy));
        assert!(err.is_transient());
        assert_eq!(err.text(), "+CME ERROR: 14");
        assert_eq!(err.to_string(), "SimBusy: +CME ERROR: 14");
    }

    #[test]
    fn test_transport_errors_have_generic_name() {
        let err = ModemError::PortClosed;
        assert_eq!(err.kind(), None);
        assert_eq!(err.dbus_name(), "org.freedesktop.ModemManager.Error");
    }

    #[test]
    fn test_io_conversion() {
        let err: ModemError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, ModemError::Io(_)));
    }
}
