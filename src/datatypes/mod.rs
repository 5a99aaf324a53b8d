// ABOUTME: Enumerations and value types shared across the daemon and its D-Bus surface
// ABOUTME: States, bands, network modes, error kinds, charsets and interface names

mod charset;
mod error_kind;
mod interface;
mod modem_state;
mod network;

pub use charset::Charset;
pub use error_kind::{CmeCode, CmsCode, ErrorKind};
pub use interface::Interface;
pub use modem_state::{ModemState, UssdState};
pub use network::{
    AccessTech, AllowedAuth, AllowedMode, Band, IpMethod, NetworkMode, NetworkOperator, RegStatus,
    RegistrationInfo, rssi_to_percentage,
};
