// ABOUTME: Per-family bundle of catalog overrides, notification translations, mode tables and hooks
// ABOUTME: The engine and wrapper consult it; families only differ in the data and functions held here

mod ericsson;
mod huawei;
mod icera;
mod option;
mod zte;

use crate::datatypes::{AllowedMode, Band, ErrorKind, IpMethod, NetworkMode};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{Catalog, Translation};
use crate::signals::Capability;
use crate::wrapper::Wrapper;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use huawei::{huawei_conn_mode, huawei_speed_report};

/// Boxed future returned by family hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type WrapperHook<T> = for<'a> fn(&'a Wrapper) -> BoxFuture<'a, ModemResult<T>>;
pub type BandHook = for<'a> fn(&'a Wrapper, Band) -> BoxFuture<'a, ModemResult<()>>;
pub type ModeHook = for<'a> fn(&'a Wrapper, NetworkMode) -> BoxFuture<'a, ModemResult<()>>;
pub type AllowedHook = for<'a> fn(&'a Wrapper, AllowedMode) -> BoxFuture<'a, ModemResult<()>>;
pub type SmscHook = for<'a> fn(&'a Wrapper, String) -> BoxFuture<'a, ModemResult<()>>;
pub type AuthHook =
    for<'a> fn(&'a Wrapper, String, String, u32) -> BoxFuture<'a, ModemResult<()>>;

/// Vendor value a mode or band table maps to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Code {
    Num(u32),
    Pair(u32, u32),
    Triple(u32, u32, u32),
    /// Symbolic band names, as used by Option's `_OPBM`
    Name(&'static str),
}

impl Code {
    pub fn num(&self) -> Option<u32> {
        match self {
            Code::Num(n) => Some(*n),
            _ => None,
        }
    }
}

/// Family behaviour that cannot be described by tables alone.
///
/// Every hook is optional; the wrapper falls back to the standard 27.007
/// command, or fails with `OperationNotSupported` where there is none.
#[derive(Clone, Copy, Default)]
pub struct Hooks {
    /// Wait until the SIM is usable before initialising it
    pub sim_ready: Option<WrapperHook<()>>,
    pub get_band: Option<WrapperHook<Band>>,
    pub set_band: Option<BandHook>,
    pub get_network_mode: Option<WrapperHook<NetworkMode>>,
    pub set_network_mode: Option<ModeHook>,
    pub set_allowed_mode: Option<AllowedHook>,
    pub get_signal_quality: Option<WrapperHook<u32>>,
    pub set_smsc: Option<SmscHook>,
    /// Store credentials for the NDIS context: user, password, auth type
    pub authenticate: Option<AuthHook>,
    /// Bring up an NDIS data call on the stored context
    pub connect: Option<WrapperHook<()>>,
    pub disconnect: Option<WrapperHook<()>>,
    /// `[ip, dns1, dns2, dns3]`
    pub get_ip4_config: Option<WrapperHook<Vec<String>>>,
    /// Post-process operator names reported by `+COPS?`
    pub clean_operator_name: Option<fn(&str) -> String>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = Vec::new();
        let flags = [
            ("sim_ready", self.sim_ready.is_some()),
            ("get_band", self.get_band.is_some()),
            ("set_band", self.set_band.is_some()),
            ("get_network_mode", self.get_network_mode.is_some()),
            ("set_network_mode", self.set_network_mode.is_some()),
            ("set_allowed_mode", self.set_allowed_mode.is_some()),
            ("get_signal_quality", self.get_signal_quality.is_some()),
            ("set_smsc", self.set_smsc.is_some()),
            ("authenticate", self.authenticate.is_some()),
            ("connect", self.connect.is_some()),
            ("disconnect", self.disconnect.is_some()),
            ("get_ip4_config", self.get_ip4_config.is_some()),
            ("clean_operator_name", self.clean_operator_name.is_some()),
        ];
        for (name, present) in flags {
            if present {
                set.push(name);
            }
        }
        f.debug_tuple("Hooks").field(&set).finish()
    }
}

/// Immutable description of one device family.
#[derive(Debug)]
pub struct Customizer {
    family: &'static str,
    catalog: Catalog,
    async_regex: Option<Regex>,
    translations: HashMap<String, Translation>,
    band_dict: Vec<(Band, Code)>,
    conn_dict: Vec<(NetworkMode, Code)>,
    allowed_dict: Vec<(AllowedMode, Code)>,
    capabilities: Vec<Capability>,
    hooks: Hooks,
    auth_delay: Duration,
    auth_retries: u32,
    sim_init: Vec<String>,
    ip_method: IpMethod,
    radio_off: u32,
    ussd_old_mode: bool,
}

/// Seconds a freshly unlocked SIM needs before it answers reliably.
const AUTH_DELAY: Duration = Duration::from_secs(15);

impl Customizer {
    /// Plain 27.007 device: standard catalog, no vendor notifications.
    pub fn generic() -> ModemResult<Customizer> {
        Ok(Customizer {
            family: "generic",
            catalog: Catalog::standard()?,
            async_regex: None,
            translations: HashMap::new(),
            band_dict: Vec::new(),
            conn_dict: Vec::new(),
            allowed_dict: Vec::new(),
            capabilities: Vec::new(),
            hooks: Hooks::default(),
            auth_delay: AUTH_DELAY,
            auth_retries: 3,
            sim_init: Vec::new(),
            ip_method: IpMethod::Ppp,
            radio_off: 0,
            ussd_old_mode: false,
        })
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn async_regex(&self) -> Option<&Regex> {
        self.async_regex.as_ref()
    }

    pub fn translations(&self) -> &HashMap<String, Translation> {
        &self.translations
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn auth_delay(&self) -> Duration {
        self.auth_delay
    }

    /// How many `+CPIN?` probes the authentication machine makes.
    pub fn auth_retries(&self) -> u32 {
        self.auth_retries
    }

    /// Extra AT strings sent once the SIM is initialised. Failures are
    /// logged and ignored.
    pub fn sim_init(&self) -> &[String] {
        &self.sim_init
    }

    pub fn ip_method(&self) -> IpMethod {
        self.ip_method
    }

    /// `AT+CFUN` level that switches the radio off.
    pub fn radio_off(&self) -> u32 {
        self.radio_off
    }

    pub fn ussd_old_mode(&self) -> bool {
        self.ussd_old_mode
    }

    pub fn with_ussd_old_mode(mut self, old_mode: bool) -> Self {
        self.ussd_old_mode = old_mode;
        self
    }

    pub fn with_auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = delay;
        self
    }

    pub fn band_dict(&self) -> &[(Band, Code)] {
        &self.band_dict
    }

    pub fn conn_dict(&self) -> &[(NetworkMode, Code)] {
        &self.conn_dict
    }

    pub fn allowed_dict(&self) -> &[(AllowedMode, Code)] {
        &self.allowed_dict
    }

    pub fn band_code(&self, band: Band) -> ModemResult<Code> {
        lookup(&self.band_dict, &band, "band")
    }

    pub fn conn_code(&self, mode: NetworkMode) -> ModemResult<Code> {
        lookup(&self.conn_dict, &mode, "network mode")
    }

    pub fn allowed_code(&self, mode: AllowedMode) -> ModemResult<Code> {
        lookup(&self.allowed_dict, &mode, "allowed mode")
    }

    /// Network mode whose vendor code is `code`.
    pub fn conn_from_code(&self, code: Code) -> Option<NetworkMode> {
        self.conn_dict
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(mode, _)| *mode)
    }

    /// Bitwise OR of every band in the table except `ANY`.
    pub fn supported_bands(&self) -> Band {
        self.band_dict
            .iter()
            .filter(|(band, _)| *band != Band::ANY)
            .fold(Band::UNKNOWN, |acc, (band, _)| acc | *band)
    }

    /// Bitwise OR of every mode in the table except `ANY`.
    pub fn supported_modes(&self) -> u32 {
        self.conn_dict
            .iter()
            .filter(|(mode, _)| *mode != NetworkMode::Any)
            .fold(0, |acc, (mode, _)| acc | *mode as u32)
    }

    fn translate(&mut self, name: &str, translation: Translation) {
        self.translations.insert(name.to_string(), translation);
    }
}

fn lookup<K: PartialEq + fmt::Debug>(table: &[(K, Code)], key: &K, what: &str) -> ModemResult<Code> {
    table
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, code)| *code)
        .ok_or_else(|| {
            ModemError::new(
                ErrorKind::OperationNotSupported,
                format!("unsupported {} {:?}", what, key),
            )
        })
}

/// Device families with their own customizer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    Generic,
    Huawei,
    Zte,
    Ericsson,
    Option,
    /// Option devices with an NDIS (`hso`) interface
    OptionHso,
    Icera,
}

impl Family {
    pub fn customizer(&self) -> ModemResult<Customizer> {
        match self {
            Family::Generic => Customizer::generic(),
            Family::Huawei => huawei::customizer(),
            Family::Zte => zte::customizer(),
            Family::Ericsson => ericsson::customizer(),
            Family::Option => option::customizer(),
            Family::OptionHso => option::hso_customizer(),
            Family::Icera => icera::customizer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_has_no_tables() {
        let custom = Customizer::generic().unwrap();
        assert_eq!(custom.supported_bands(), Band::UNKNOWN);
        assert_eq!(custom.supported_modes(), 0);
        assert!(custom.async_regex().is_none());
        let err = custom.band_code(Band::DCS).unwrap_err();
        assert!(err.is(ErrorKind::OperationNotSupported));
    }

    #[test]
    fn test_every_family_builds() {
        for family in [
            Family::Generic,
            Family::Huawei,
            Family::Zte,
            Family::Ericsson,
            Family::Option,
            Family::OptionHso,
            Family::Icera,
        ] {
            let custom = family.customizer().unwrap();
            assert!(custom.catalog().contains("check_pin"), "{:?}", family);
        }
    }

    #[test]
    fn test_supported_masks_skip_any() {
        let custom = Family::Huawei.customizer().unwrap();
        assert!(!custom.supported_bands().contains(Band::ANY));
        assert!(custom.supported_bands().contains(Band::U2100));
        assert_eq!(custom.supported_modes() & NetworkMode::Any as u32, 0);
        assert_ne!(custom.supported_modes() & NetworkMode::ThreeGOnly as u32, 0);
    }

    #[test]
    fn test_builders() {
        let custom = Customizer::generic()
            .unwrap()
            .with_ussd_old_mode(true)
            .with_auth_delay(Duration::from_secs(1));
        assert!(custom.ussd_old_mode());
        assert_eq!(custom.auth_delay(), Duration::from_secs(1));
    }
}
