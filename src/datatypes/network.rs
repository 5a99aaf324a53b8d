// ABOUTME: Public radio-network constants: registration status, access technology, modes and bands
// ABOUTME: Values are the wire values clients observe; family-specific encodings live in customizers

use num_enum::TryFromPrimitive;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// `+CREG` registration status.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum RegStatus {
    /// Not registered, not searching
    #[default]
    Idle = 0,
    /// Registered on the home network
    Home = 1,
    /// Searching for an operator
    Searching = 2,
    /// Registration denied
    Denied = 3,
    Unknown = 4,
    /// Registered, roaming
    Roaming = 5,
}

impl RegStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegStatus::Home | RegStatus::Roaming)
    }
}

/// Access technology as exported on the network interface.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum AccessTech {
    #[default]
    Unknown = 0,
    Gsm = 1,
    GsmCompat = 2,
    Gprs = 3,
    Edge = 4,
    Umts = 5,
    Hsdpa = 6,
    Hsupa = 7,
    Hspa = 8,
    Lte = 9,
}

impl AccessTech {
    /// Decode the `<AcT>` field of `+COPS?` replies.
    pub fn from_cops(act: &str) -> AccessTech {
        match act.trim() {
            "0" => AccessTech::Gprs,
            "1" => AccessTech::GsmCompat,
            "2" => AccessTech::Umts,
            "3" => AccessTech::Edge,
            "4" => AccessTech::Hsdpa,
            "5" => AccessTech::Hsupa,
            "6" => AccessTech::Hspa,
            "7" => AccessTech::Lte,
            _ => AccessTech::Unknown,
        }
    }

    /// Decode the `<AcT>` field of `+COPS=?` scan entries.
    pub fn from_scan(act: &str) -> AccessTech {
        match act.trim() {
            "0" | "1" => AccessTech::GsmCompat,
            "2" => AccessTech::Umts,
            "3" => AccessTech::Edge,
            "4" => AccessTech::Hsdpa,
            "5" => AccessTech::Hsupa,
            "6" => AccessTech::Hspa,
            "7" => AccessTech::Lte,
            _ => AccessTech::Unknown,
        }
    }
}

impl From<NetworkMode> for AccessTech {
    fn from(mode: NetworkMode) -> Self {
        match mode {
            NetworkMode::Gprs => AccessTech::Gprs,
            NetworkMode::Edge => AccessTech::Edge,
            NetworkMode::Umts => AccessTech::Umts,
            NetworkMode::Hsdpa => AccessTech::Hsdpa,
            NetworkMode::Hsupa => AccessTech::Hsupa,
            NetworkMode::Hspa => AccessTech::Hspa,
            NetworkMode::Lte => AccessTech::Lte,
            _ => AccessTech::Unknown,
        }
    }
}

/// Network mode values. Notifications carry a single technology, while
/// `SupportedModes` is the bitwise OR of the preference values.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum NetworkMode {
    #[default]
    Unknown = 0x0000_0000,
    Any = 0x0000_0001,
    Gprs = 0x0000_0002,
    Edge = 0x0000_0004,
    Umts = 0x0000_0008,
    Hsdpa = 0x0000_0010,
    TwoGPreferred = 0x0000_0020,
    ThreeGPreferred = 0x0000_0040,
    TwoGOnly = 0x0000_0080,
    ThreeGOnly = 0x0000_0100,
    Hsupa = 0x0000_0200,
    Hspa = 0x0000_0400,
    Lte = 0x0000_0800,
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkMode::Unknown => "UNKNOWN",
            NetworkMode::Any => "ANY",
            NetworkMode::Gprs => "GPRS",
            NetworkMode::Edge => "EDGE",
            NetworkMode::Umts => "UMTS",
            NetworkMode::Hsdpa => "HSDPA",
            NetworkMode::TwoGPreferred => "2GPREF",
            NetworkMode::ThreeGPreferred => "3GPREF",
            NetworkMode::TwoGOnly => "2GONLY",
            NetworkMode::ThreeGOnly => "3GONLY",
            NetworkMode::Hsupa => "HSUPA",
            NetworkMode::Hspa => "HSPA",
            NetworkMode::Lte => "LTE",
        };
        f.write_str(name)
    }
}

/// Allowed-mode preference a client may request.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum AllowedMode {
    #[default]
    Any = 0,
    TwoGPreferred = 1,
    ThreeGPreferred = 2,
    TwoGOnly = 3,
    ThreeGOnly = 4,
}

impl From<AllowedMode> for NetworkMode {
    fn from(mode: AllowedMode) -> Self {
        match mode {
            AllowedMode::Any => NetworkMode::Any,
            AllowedMode::TwoGPreferred => NetworkMode::TwoGPreferred,
            AllowedMode::ThreeGPreferred => NetworkMode::ThreeGPreferred,
            AllowedMode::TwoGOnly => NetworkMode::TwoGOnly,
            AllowedMode::ThreeGOnly => NetworkMode::ThreeGOnly,
        }
    }
}

/// Band bitmask. `ANY` cannot be combined with other bands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Band(pub u32);

impl Band {
    pub const UNKNOWN: Band = Band(0x0);
    pub const ANY: Band = Band(0x1);
    /// 900 MHz
    pub const EGSM: Band = Band(0x2);
    /// 1800 MHz
    pub const DCS: Band = Band(0x4);
    /// 1900 MHz
    pub const PCS: Band = Band(0x8);
    /// 850 MHz
    pub const G850: Band = Band(0x10);
    /// WCDMA 2100 MHz
    pub const U2100: Band = Band(0x20);
    /// WCDMA 1800 MHz
    pub const U1800: Band = Band(0x40);
    /// WCDMA AWS 1700/2100 MHz
    pub const U17IV: Band = Band(0x80);
    pub const U800: Band = Band(0x100);
    pub const U850: Band = Band(0x200);
    pub const U900: Band = Band(0x400);
    pub const U17IX: Band = Band(0x800);
    pub const U1900: Band = Band(0x1000);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Band) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: Band) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Band {
    type Output = Band;

    fn bitor(self, rhs: Band) -> Band {
        Band(self.0 | rhs.0)
    }
}

impl BitOrAssign for Band {
    fn bitor_assign(&mut self, rhs: Band) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Band {
    type Output = Band;

    fn bitand(self, rhs: Band) -> Band {
        Band(self.0 & rhs.0)
    }
}

/// How an IP configuration is obtained once a data call is up.
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum IpMethod {
    #[default]
    Ppp = 0,
    Static = 1,
    Dhcp = 2,
}

/// Authentication methods a client allows for a data call, as a bitmask.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct AllowedAuth(pub u32);

impl AllowedAuth {
    pub const UNKNOWN: AllowedAuth = AllowedAuth(0x0);
    pub const NONE: AllowedAuth = AllowedAuth(0x1);
    pub const PAP: AllowedAuth = AllowedAuth(0x2);
    pub const CHAP: AllowedAuth = AllowedAuth(0x4);
    pub const MSCHAP: AllowedAuth = AllowedAuth(0x8);
    pub const MSCHAPV2: AllowedAuth = AllowedAuth(0x10);
    pub const EAP: AllowedAuth = AllowedAuth(0x20);

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Single-method vendors: no auth and CHAP are honoured, anything
    /// else falls back to PAP. Returns `0` none, `1` PAP, `2` CHAP.
    pub fn single_method(&self) -> u32 {
        match *self {
            AllowedAuth::NONE => 0,
            AllowedAuth::CHAP => 2,
            _ => 1,
        }
    }
}

/// An operator returned by a network scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkOperator {
    pub status: u32,
    pub long_name: String,
    pub short_name: String,
    /// MCC+MNC
    pub netid: String,
    pub access_tech: AccessTech,
}

impl NetworkOperator {
    /// Mobile country code, the first three digits of the network id.
    pub fn mcc(&self) -> &str {
        self.netid.get(..3).unwrap_or("")
    }

    pub fn mnc(&self) -> &str {
        self.netid.get(3..).unwrap_or("")
    }
}

/// Registration snapshot: `(status, operator code, operator name)`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RegistrationInfo {
    pub status: RegStatus,
    pub operator_code: String,
    pub operator_name: String,
}

/// Convert a raw `+CSQ` rssi into a 0-100 percentage.
pub fn rssi_to_percentage(rssi: u32) -> u32 {
    if rssi < 32 { rssi * 100 / 31 } else { 0 }
}
