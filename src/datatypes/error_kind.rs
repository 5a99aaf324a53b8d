// ABOUTME: Closed taxonomy of modem failure kinds with the numeric +CME/+CMS code tables
// ABOUTME: Maps raw codes and textual error fragments onto stable kinds and D-Bus error names

use num_enum::TryFromPrimitive;
use std::fmt;

const GSM_ERROR: &str = "org.freedesktop.ModemManager.Modem.Gsm";
const GEN_ERROR: &str = "org.freedesktop.ModemManager.Error";
const SMS_ERROR: &str = "org.freedesktop.ModemManager.Error.SMS";
const MMS_ERROR: &str = "org.freedesktop.ModemManager.Error.MMS";

/// Numeric codes a modem may report in a `+CME ERROR: <code>` line
/// (3GPP TS 27.007 section 9.2 plus a couple of vendor additions).
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CmeCode {
    PhoneFailure = 0,
    NoConnection = 1,
    LinkReserved = 2,
    OperationNotAllowed = 3,
    OperationNotSupported = 4,
    PhSimPinRequired = 5,
    PhFSimPinRequired = 6,
    PhFPukRequired = 7,
    SimNotInserted = 10,
    SimPinRequired = 11,
    SimPukRequired = 12,
    SimFailure = 13,
    SimBusy = 14,
    SimWrong = 15,
    IncorrectPassword = 16,
    SimPin2Required = 17,
    SimPuk2Required = 18,
    MemoryFull = 20,
    InvalidIndex = 21,
    NotFound = 22,
    MemoryFailure = 23,
    TextTooLong = 24,
    InvalidChars = 25,
    DialStringTooLong = 26,
    InvalidDialString = 27,
    NoNetwork = 30,
    NetworkTimeout = 31,
    NetworkNotAllowed = 32,
    NetworkPinRequired = 40,
    NetworkPukRequired = 41,
    NetworkSubsetPinRequired = 42,
    NetworkSubsetPukRequired = 43,
    ServicePinRequired = 44,
    ServicePukRequired = 45,
    CorporatePinRequired = 46,
    CorporatePukRequired = 47,
    HiddenKeyRequired = 48,
    EapMethodNotSupported = 49,
    IncorrectParams = 50,
    Unknown = 100,
    GprsIllegalMs = 103,
    GprsIllegalMe = 106,
    GprsServiceNotAllowed = 107,
    GprsPlmnNotAllowed = 111,
    GprsLocationNotAllowed = 112,
    GprsRoamingNotAllowed = 113,
    GprsOptionNotSupported = 132,
    GprsNotSubscribed = 133,
    GprsOutOfOrder = 134,
    GprsPdpAuthFailure = 148,
    GprsUnspecified = 149,
    GprsInvalidClass = 150,
    ServiceTemporarilyOutOfOrder = 260,
    UnknownSubscriber = 261,
    ServiceNotInUse = 262,
    ServiceNotAvailable = 263,
    UnknownNetworkMessage = 264,
    /// Icera: operation failed
    OperationFailed = 767,
    /// Icera: SIM busy
    IceraSimBusy = 769,
    CallStateError = 65281,
}

/// Numeric codes a modem may report in a `+CMS ERROR: <code>` line
/// (3GPP TS 27.005 section 3.2.5).
#[derive(TryFromPrimitive)]
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CmsCode {
    /// ME failure
    PhoneFailure = 300,
    /// SMS service of ME reserved
    ServiceReserved = 301,
    /// Operation not allowed
    OperationNotAllowed = 302,
    /// Operation not supported
    OperationNotSupported = 303,
    /// Invalid PDU mode parameter
    InvalidPduParameter = 304,
    /// Invalid text mode parameter
    InvalidTextParameter = 305,
    /// SIM not inserted
    SimNotInserted = 310,
    /// SIM PIN required
    SimPinRequired = 311,
    /// SIM failure
    SimFailure = 313,
    /// SIM busy
    SimBusy = 314,
    /// SIM wrong
    SimWrong = 315,
    /// Memory failure
    MemoryFailure = 320,
    /// Invalid memory index
    InvalidMemoryIndex = 321,
    /// Memory full
    MemoryFull = 322,
    /// SMSC address unknown
    SmscAddressUnknown = 330,
    /// No network service
    NoNetworkService = 331,
    /// Unknown error
    Unknown = 500,
}

/// Every failure the modem layer can surface to a client.
///
/// The kind is the programmatic identity of an error; the text that
/// accompanies it in [`crate::ModemError`] is informational only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plain `ERROR` reply
    GenericError,
    /// `INPUT VALUE IS OUT OF RANGE` reply
    InputValueError,
    /// Vendor "operation failed"
    General,
    PhoneFailure,
    NoConnection,
    LinkReserved,
    OperationNotAllowed,
    OperationNotSupported,
    PhSimPinRequired,
    PhFSimPinRequired,
    PhFPukRequired,
    SimNotInserted,
    SimPinRequired,
    SimPukRequired,
    SimFailure,
    SimBusy,
    SimWrong,
    SimNotStarted,
    IncorrectPassword,
    SimPin2Required,
    SimPuk2Required,
    MemoryFull,
    InvalidIndex,
    NotFound,
    MemoryFailure,
    TextTooLong,
    InvalidChars,
    DialStringTooLong,
    InvalidDialString,
    NoNetwork,
    NetworkTimeout,
    NetworkNotAllowed,
    NetworkPinRequired,
    NetworkPukRequired,
    NetworkSubsetPinRequired,
    NetworkSubsetPukRequired,
    ServicePinRequired,
    ServicePukRequired,
    CorporatePinRequired,
    CorporatePukRequired,
    HiddenKeyRequired,
    EapMethodNotSupported,
    IncorrectParams,
    Unknown,
    GprsIllegalMs,
    GprsIllegalMe,
    GprsServiceNotAllowed,
    GprsPlmnNotAllowed,
    GprsLocationNotAllowed,
    GprsRoamingNotAllowed,
    GprsOptionNotSupported,
    GprsNotSubscribed,
    GprsOutOfOrder,
    GprsPdpAuthFailure,
    GprsUnspecified,
    GprsInvalidClass,
    ServiceTemporarilyOutOfOrder,
    UnknownSubscriber,
    ServiceNotInUse,
    ServiceNotAvailable,
    UnknownNetworkMessage,
    CallStateError,
    CallIndexError,
    CharsetError,
    Connected,
    MalformedUssdPdu,
    SerialResponseTimeout,
    ExpiredNotification,
    Cms(CmsCode),
}

impl From<CmeCode> for ErrorKind {
    fn from(code: CmeCode) -> Self {
        match code {
            CmeCode::PhoneFailure => ErrorKind::PhoneFailure,
            CmeCode::NoConnection => ErrorKind::NoConnection,
            CmeCode::LinkReserved => ErrorKind::LinkReserved,
            CmeCode::OperationNotAllowed => ErrorKind::OperationNotAllowed,
            CmeCode::OperationNotSupported => ErrorKind::OperationNotSupported,
            CmeCode::PhSimPinRequired => ErrorKind::PhSimPinRequired,
            CmeCode::PhFSimPinRequired => ErrorKind::PhFSimPinRequired,
            CmeCode::PhFPukRequired => ErrorKind::PhFPukRequired,
            CmeCode::SimNotInserted => ErrorKind::SimNotInserted,
            CmeCode::SimPinRequired => ErrorKind::SimPinRequired,
            CmeCode::SimPukRequired => ErrorKind::SimPukRequired,
            CmeCode::SimFailure => ErrorKind::SimFailure,
            CmeCode::SimBusy | CmeCode::IceraSimBusy => ErrorKind::SimBusy,
            CmeCode::SimWrong => ErrorKind::SimWrong,
            CmeCode::IncorrectPassword => ErrorKind::IncorrectPassword,
            CmeCode::SimPin2Required => ErrorKind::SimPin2Required,
            CmeCode::SimPuk2Required => ErrorKind::SimPuk2Required,
            CmeCode::MemoryFull => ErrorKind::MemoryFull,
            CmeCode::InvalidIndex => ErrorKind::InvalidIndex,
            CmeCode::NotFound => ErrorKind::NotFound,
            CmeCode::MemoryFailure => ErrorKind::MemoryFailure,
            CmeCode::TextTooLong => ErrorKind::TextTooLong,
            CmeCode::InvalidChars => ErrorKind::InvalidChars,
            CmeCode::DialStringTooLong => ErrorKind::DialStringTooLong,
            CmeCode::InvalidDialString => ErrorKind::InvalidDialString,
            CmeCode::NoNetwork => ErrorKind::NoNetwork,
            CmeCode::NetworkTimeout => ErrorKind::NetworkTimeout,
            CmeCode::NetworkNotAllowed => ErrorKind::NetworkNotAllowed,
            CmeCode::NetworkPinRequired => ErrorKind::NetworkPinRequired,
            CmeCode::NetworkPukRequired => ErrorKind::NetworkPukRequired,
            CmeCode::NetworkSubsetPinRequired => ErrorKind::NetworkSubsetPinRequired,
            CmeCode::NetworkSubsetPukRequired => ErrorKind::NetworkSubsetPukRequired,
            CmeCode::ServicePinRequired => ErrorKind::ServicePinRequired,
            CmeCode::ServicePukRequired => ErrorKind::ServicePukRequired,
            CmeCode::CorporatePinRequired => ErrorKind::CorporatePinRequired,
            CmeCode::CorporatePukRequired => ErrorKind::CorporatePukRequired,
            CmeCode::HiddenKeyRequired => ErrorKind::HiddenKeyRequired,
            CmeCode::EapMethodNotSupported => ErrorKind::EapMethodNotSupported,
            CmeCode::IncorrectParams => ErrorKind::IncorrectParams,
            CmeCode::Unknown => ErrorKind::Unknown,
            CmeCode::GprsIllegalMs => ErrorKind::GprsIllegalMs,
            CmeCode::GprsIllegalMe => ErrorKind::GprsIllegalMe,
            CmeCode::GprsServiceNotAllowed => ErrorKind::GprsServiceNotAllowed,
            CmeCode::GprsPlmnNotAllowed => ErrorKind::GprsPlmnNotAllowed,
            CmeCode::GprsLocationNotAllowed => ErrorKind::GprsLocationNotAllowed,
            CmeCode::GprsRoamingNotAllowed => ErrorKind::GprsRoamingNotAllowed,
            CmeCode::GprsOptionNotSupported => ErrorKind::GprsOptionNotSupported,
            CmeCode::GprsNotSubscribed => ErrorKind::GprsNotSubscribed,
            CmeCode::GprsOutOfOrder => ErrorKind::GprsOutOfOrder,
            CmeCode::GprsPdpAuthFailure => ErrorKind::GprsPdpAuthFailure,
            CmeCode::GprsUnspecified => ErrorKind::GprsUnspecified,
            CmeCode::GprsInvalidClass => ErrorKind::GprsInvalidClass,
            CmeCode::ServiceTemporarilyOutOfOrder => ErrorKind::ServiceTemporarilyOutOfOrder,
            CmeCode::UnknownSubscriber => ErrorKind::UnknownSubscriber,
            CmeCode::ServiceNotInUse => ErrorKind::ServiceNotInUse,
            CmeCode::ServiceNotAvailable => ErrorKind::ServiceNotAvailable,
            CmeCode::UnknownNetworkMessage => ErrorKind::UnknownNetworkMessage,
            CmeCode::OperationFailed => ErrorKind::General,
            CmeCode::CallStateError => ErrorKind::CallStateError,
        }
    }
}

impl ErrorKind {
    /// Resolve the `error` fragment captured by the global error regex,
    /// e.g. `+CME ERROR: 11`, `+CME ERROR: SIM busy`, `+CMS ERROR: 314`
    /// or a bare `ERROR`.
    pub fn from_fragment(fragment: &str) -> ErrorKind {
        let fragment = fragment.trim();

        if fragment == "ERROR" {
            return ErrorKind::GenericError;
        }
        if fragment == "INPUT VALUE IS OUT OF RANGE" {
            return ErrorKind::InputValueError;
        }

        if let Some(code) = fragment.strip_prefix("+CMS ERROR:") {
            return code
                .trim()
                .parse::<u16>()
                .ok()
                .and_then(|c| CmsCode::try_from(c).ok())
                .map(ErrorKind::Cms)
                .unwrap_or(ErrorKind::Unknown);
        }

        if let Some(rest) = fragment.strip_prefix("+CME ERROR:") {
            let rest = rest.trim();
            if let Ok(code) = rest.parse::<u32>() {
                return CmeCode::try_from(code)
                    .map(ErrorKind::from)
                    .unwrap_or(ErrorKind::Unknown);
            }
            return Self::from_cme_text(rest);
        }

        ErrorKind::Unknown
    }

    fn from_cme_text(text: &str) -> ErrorKind {
        match text.to_ascii_lowercase().as_str() {
            "incorrect password" => ErrorKind::IncorrectPassword,
            "invalid characters in dial string" => ErrorKind::InvalidDialString,
            "no network service" => ErrorKind::NoNetwork,
            "not found" => ErrorKind::NotFound,
            "operation not allowed" => ErrorKind::OperationNotAllowed,
            "operation not supported" => ErrorKind::OperationNotSupported,
            "text string too long" => ErrorKind::TextTooLong,
            "sim busy" => ErrorKind::SimBusy,
            "sim failure" => ErrorKind::SimFailure,
            "sim interface not started" | "sim interface not started yet" => {
                ErrorKind::SimNotStarted
            }
            "sim not inserted" => ErrorKind::SimNotInserted,
            "sim pin required" => ErrorKind::SimPinRequired,
            "sim puk required" => ErrorKind::SimPukRequired,
            "sim pin2 required" => ErrorKind::SimPin2Required,
            "sim puk2 required" => ErrorKind::SimPuk2Required,
            "sim wrong" => ErrorKind::SimWrong,
            "memory full" => ErrorKind::MemoryFull,
            "invalid index" => ErrorKind::InvalidIndex,
            "phone failure" => ErrorKind::PhoneFailure,
            _ => ErrorKind::Unknown,
        }
    }

    /// Short name of the kind, the last component of its D-Bus error name.
    pub fn name(&self) -> String {
        match self {
            ErrorKind::Cms(code) => format!("CMSError{}", *code as u16),
            other => format!("{:?}", other),
        }
    }

    /// Fully qualified D-Bus error name clients key on.
    pub fn dbus_name(&self) -> String {
        match self {
            ErrorKind::GenericError | ErrorKind::InputValueError => GEN_ERROR.to_string(),
            ErrorKind::ExpiredNotification => format!("{}.{}", MMS_ERROR, self.name()),
            ErrorKind::Cms(_) => format!("{}.{}", SMS_ERROR, self.name()),
            ErrorKind::MalformedUssdPdu => format!("{}.MalformedUssdPduError", GSM_ERROR),
            _ => format!("{}.{}", GSM_ERROR, self.name()),
        }
    }

    /// Whether an initialisation path should retry after this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SimBusy | ErrorKind::SimNotStarted | ErrorKind::Cms(CmsCode::SimBusy)
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cme_codes() {
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 10"), ErrorKind::SimNotInserted);
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 11"), ErrorKind::SimPinRequired);
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 14"), ErrorKind::SimBusy);
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 769"), ErrorKind::SimBusy);
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 767"), ErrorKind::General);
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 65281"), ErrorKind::CallStateError);
    }

    #[test]
    fn test_unmapped_code_is_unknown() {
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: 9999"), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_fragment("+CMS ERROR: 999"), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: frobnicated"), ErrorKind::Unknown);
    }

    #[test]
    fn test_textual_cme_errors() {
        assert_eq!(ErrorKind::from_fragment("+CME ERROR: SIM busy"), ErrorKind::SimBusy);
        assert_eq!(
            ErrorKind::from_fragment("+CME ERROR: SIM interface not started yet"),
            ErrorKind::SimNotStarted
        );
        assert_eq!(
            ErrorKind::from_fragment("+CME ERROR: incorrect password"),
            ErrorKind::IncorrectPassword
        );
    }

    #[test]
    fn test_cms_and_generic() {
        assert_eq!(
            ErrorKind::from_fragment("+CMS ERROR: 314"),
            ErrorKind::Cms(CmsCode::SimBusy)
        );
        assert_eq!(ErrorKind::from_fragment("ERROR"), ErrorKind::GenericError);
        assert_eq!(
            ErrorKind::from_fragment("INPUT VALUE IS OUT OF RANGE"),
            ErrorKind::InputValueError
        );
    }

    #[test]
    fn test_dbus_names() {
        assert_eq!(
            ErrorKind::SimPinRequired.dbus_name(),
            "org.freedesktop.ModemManager.Modem.Gsm.SimPinRequired"
        );
        assert_eq!(
            ErrorKind::ExpiredNotification.dbus_name(),
            "org.freedesktop.ModemManager.Error.MMS.ExpiredNotification"
        );
        assert_eq!(
            ErrorKind::Cms(CmsCode::SimBusy).dbus_name(),
            "org.freedesktop.ModemManager.Error.SMS.CMSError314"
        );
        assert_eq!(ErrorKind::GenericError.dbus_name(), "org.freedesktop.ModemManager.Error");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::SimBusy.is_transient());
        assert!(ErrorKind::SimNotStarted.is_transient());
        assert!(ErrorKind::Cms(CmsCode::SimBusy).is_transient());
        assert!(!ErrorKind::SimFailure.is_transient());
    }
}
