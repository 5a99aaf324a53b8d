// ABOUTME: Table of known device plugins with lookups by bus ids, remote name and reported model
// ABOUTME: Shared-id Huawei entries resolve to a concrete model once the modem has identified itself

use super::Plugin;
use crate::customizer::Family;
use tracing::{debug, info};

const HUAWEI: u16 = 0x12d1;
const ZTE: u16 = 0x19d2;
const ERICSSON: u16 = 0x0bdb;
const OPTION: u16 = 0x0af0;

#[derive(Clone, Debug, Default)]
pub struct Registry {
    plugins: Vec<Plugin>,
}

impl Registry {
    pub fn new(plugins: Vec<Plugin>) -> Registry {
        Registry { plugins }
    }

    /// Representative devices of every supported family.
    pub fn builtin() -> Registry {
        let huawei = |name, remote| Plugin::new(name, Family::Huawei).remote(remote);
        let plugins = vec![
            Plugin::new("Huawei EXXX", Family::Huawei)
                .ids(HUAWEI, &[0x1003, 0x1004])
                .mapping(
                    &[
                        ("E870", "Huawei E870"),
                        ("E17X", "Huawei E17X"),
                        ("E180", "Huawei E180"),
                        ("E220", "Huawei E220"),
                        ("E270", "Huawei E270"),
                        ("E272", "Huawei E272"),
                        ("E160X", "Huawei K3565"),
                        ("K3565", "Huawei K3565"),
                        ("B970", "Huawei B970"),
                    ],
                    "Huawei E220",
                ),
            Plugin::new("Huawei EXXX", Family::Huawei)
                .ids(HUAWEI, &[0x1001])
                .mapping(
                    &[
                        ("E169", "Huawei E169"),
                        ("E510", "Huawei E510"),
                        ("183", "Huawei E618"),
                        ("E620", "Huawei E620"),
                        ("E660", "Huawei E660"),
                        ("E660A", "Huawei E660A"),
                        ("E3735", "Huawei E3735"),
                        ("K2540", "Huawei K2540"),
                        ("K3520", "Huawei K3520"),
                        ("K3715", "Huawei K3715"),
                        ("EM730V", "Huawei EM730V"),
                        ("EM770", "Huawei EM770"),
                    ],
                    "Huawei E660",
                ),
            huawei("Huawei E870", "E870"),
            huawei("Huawei E17X", "E17X"),
            huawei("Huawei E180", "E180"),
            huawei("Huawei E220", "E220"),
            huawei("Huawei E270", "E270"),
            huawei("Huawei E272", "E272"),
            huawei("Huawei K3565", "K3565"),
            huawei("Huawei B970", "B970"),
            huawei("Huawei E169", "E169"),
            huawei("Huawei E510", "E510"),
            huawei("Huawei E618", "E618"),
            huawei("Huawei E620", "E620"),
            huawei("Huawei E660", "E660"),
            huawei("Huawei E660A", "E660A"),
            huawei("Huawei E3735", "E3735"),
            huawei("Huawei K2540", "K2540"),
            huawei("Huawei K3520", "K3520"),
            huawei("Huawei K3715", "K3715"),
            huawei("Huawei EM730V", "EM730V"),
            huawei("Huawei EM770", "EM770"),
            huawei("Huawei E1750", "E1750")
                .ids(HUAWEI, &[0x140c, 0x1436])
                .ussd_old_mode(),
            Plugin::new("ZTE MF636", Family::Zte)
                .remote("MF636")
                .ids(ZTE, &[0x0031]),
            Plugin::new("ZTE K3565-Z", Family::Zte)
                .remote("K3565-Z")
                .ids(ZTE, &[0x0049]),
            // later firmwares moved the ports around
            Plugin::new("ZTE K3565-Z", Family::Zte)
                .remote("K3565-Z")
                .ids(ZTE, &[0x0052])
                .hardcoded_ports(2, 1),
            Plugin::new("ZTE K3565-Z", Family::Zte)
                .remote("K3565-Z")
                .ids(ZTE, &[0x0063])
                .hardcoded_ports(3, 1),
            Plugin::new("ZTE MF651", Family::Icera)
                .remote("HSDPA mobile station")
                .ids(ZTE, &[0x0116]),
            Plugin::new("Ericsson F3507G", Family::Ericsson)
                .remote("F3507g")
                .ids(ERICSSON, &[0x1900, 0x1902]),
            Plugin::new("Option Etna", Family::Option)
                .remote("GlobeTrotter HSUPA Modem")
                .ids(OPTION, &[0x7001]),
            Plugin::new("Option GT M380", Family::OptionHso)
                .remote("GTMxxx")
                .ids(OPTION, &[0x7211]),
            Plugin::new("Option Icon 401", Family::OptionHso)
                .remote("GlobeTrotter HSUPA Modem")
                .ids(OPTION, &[0x7401]),
        ];
        Registry::new(plugins)
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn find_by_ids(&self, vendor: u16, product: u16) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.matches(vendor, product))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub fn find_by_remote_name(&self, remote_name: &str) -> Option<&Plugin> {
        self.plugins
            .iter()
            .find(|p| p.remote_name == Some(remote_name))
    }

    /// Settle on the plugin for a device whose bus ids gave `candidate`
    /// (if anything) and which answered `model` to `AT+CGMM`.
    ///
    /// Shared-id plugins go through their mapping; everything else is
    /// looked up by remote name and keeps `candidate` when nothing matches.
    pub fn refine(&self, candidate: Option<&Plugin>, model: &str) -> Option<Plugin> {
        if let Some(shared) = candidate.filter(|p| p.is_shared()) {
            let target = shared
                .mapping
                .iter()
                .find(|(reply, _)| *reply == model)
                .map(|(_, name)| *name)
                .or(shared.default_model)?;
            let mut refined = self.find_by_name(target)?.clone();
            // the refined model inherits the ids it was found under
            refined.ids = shared.ids.clone();
            info!(model, plugin = refined.name, "device refined by model");
            return Some(refined);
        }

        match self.find_by_remote_name(model) {
            Some(found) => {
                let mut refined = found.clone();
                if let Some(candidate) = candidate {
                    refined.ids = candidate.ids.clone();
                    refined.hardcoded_ports = candidate.hardcoded_ports;
                }
                debug!(model, plugin = refined.name, "device found by remote name");
                Some(refined)
            }
            None => candidate.cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_ids() {
        let registry = Registry::builtin();
        let plugin = registry.find_by_ids(0x19d2, 0x0031).unwrap();
        assert_eq!(plugin.name, "ZTE MF636");
        assert_eq!(plugin.family, Family::Zte);
        assert_eq!(plugin.baudrate, 115_200);
        assert!(registry.find_by_ids(0x1234, 0x5678).is_none());
    }

    #[test]
    fn test_hardcoded_ports_follow_firmware() {
        let registry = Registry::builtin();
        assert_eq!(registry.find_by_ids(0x19d2, 0x0049).unwrap().hardcoded_ports, None);
        assert_eq!(
            registry.find_by_ids(0x19d2, 0x0052).unwrap().hardcoded_ports,
            Some((2, 1))
        );
        assert_eq!(
            registry.find_by_ids(0x19d2, 0x0063).unwrap().hardcoded_ports,
            Some((3, 1))
        );
    }

    #[test]
    fn test_shared_huawei_ids_map_by_model() {
        let registry = Registry::builtin();
        let shared = registry.find_by_ids(0x12d1, 0x1003);
        assert!(shared.unwrap().is_shared());

        let refined = registry.refine(shared, "E160X").unwrap();
        assert_eq!(refined.name, "Huawei K3565");
        assert!(refined.matches(0x12d1, 0x1004));

        let fallback = registry.refine(shared, "E999").unwrap();
        assert_eq!(fallback.name, "Huawei E220");

        let shared = registry.find_by_ids(0x12d1, 0x1001);
        assert_eq!(registry.refine(shared, "183").unwrap().name, "Huawei E618");
        assert_eq!(registry.refine(shared, "").unwrap().name, "Huawei E660");
    }

    #[test]
    fn test_unknown_ids_fall_back_to_remote_name() {
        let registry = Registry::builtin();
        let refined = registry.refine(None, "GTMxxx").unwrap();
        assert_eq!(refined.name, "Option GT M380");
        assert_eq!(refined.family, Family::OptionHso);
        assert!(registry.refine(None, "Nokia 6230").is_none());
    }

    #[test]
    fn test_bus_match_survives_unknown_model() {
        let registry = Registry::builtin();
        let candidate = registry.find_by_ids(0x0bdb, 0x1900);
        let refined = registry.refine(candidate, "something else").unwrap();
        assert_eq!(refined.name, "Ericsson F3507G");
    }

    #[test]
    fn test_e1750_uses_old_ussd_mode() {
        let registry = Registry::builtin();
        let plugin = registry.find_by_ids(0x12d1, 0x1436).unwrap();
        assert!(plugin.customizer().unwrap().ussd_old_mode());
        let plugin = registry.find_by_ids(0x12d1, 0x1003).unwrap();
        assert!(!plugin.customizer().unwrap().ussd_old_mode());
    }
}
