// ABOUTME: Device plugins: which customizer, baud rate and port layout a given USB modem needs
// ABOUTME: Plugins are matched by bus ids and refined by the model string the modem reports

mod probe;
mod registry;

pub use probe::{identify, probe_port, probe_ports};
pub use registry::Registry;

use crate::customizer::{Customizer, Family};
use crate::error::ModemResult;
use crate::port::DEFAULT_BAUDRATE;
use std::fmt;

/// Static description of one device model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plugin {
    pub name: &'static str,
    /// What the modem answers to `AT+CGMM`
    pub remote_name: Option<&'static str>,
    pub family: Family,
    /// `(vendor, product)` pairs the plugin claims
    pub ids: Vec<(u16, u16)>,
    pub baudrate: u32,
    /// `(data, control)` port indexes for devices that cannot be probed
    pub hardcoded_ports: Option<(usize, usize)>,
    /// Shared-id plugins only: model reply to plugin name
    pub mapping: Vec<(&'static str, &'static str)>,
    /// Plugin used when the model reply is not in `mapping`
    pub default_model: Option<&'static str>,
    ussd_old_mode: bool,
}

impl Plugin {
    pub fn new(name: &'static str, family: Family) -> Plugin {
        Plugin {
            name,
            remote_name: None,
            family,
            ids: Vec::new(),
            baudrate: DEFAULT_BAUDRATE,
            hardcoded_ports: None,
            mapping: Vec::new(),
            default_model: None,
            ussd_old_mode: false,
        }
    }

    pub fn remote(mut self, remote_name: &'static str) -> Self {
        self.remote_name = Some(remote_name);
        self
    }

    pub fn ids(mut self, vendor: u16, products: &[u16]) -> Self {
        self.ids
            .extend(products.iter().map(|product| (vendor, *product)));
        self
    }

    pub fn hardcoded_ports(mut self, data: usize, control: usize) -> Self {
        self.hardcoded_ports = Some((data, control));
        self
    }

    pub fn mapping(
        mut self,
        mapping: &[(&'static str, &'static str)],
        default_model: &'static str,
    ) -> Self {
        self.mapping = mapping.to_vec();
        self.default_model = Some(default_model);
        self
    }

    pub fn ussd_old_mode(mut self) -> Self {
        self.ussd_old_mode = true;
        self
    }

    pub fn matches(&self, vendor: u16, product: u16) -> bool {
        self.ids.contains(&(vendor, product))
    }

    /// Whether the plugin stands for several models sharing one id.
    pub fn is_shared(&self) -> bool {
        self.default_model.is_some()
    }

    /// Build the customizer the device should be driven with.
    pub fn customizer(&self) -> ModemResult<Customizer> {
        let custom = self.family.customizer()?;
        Ok(if self.ussd_old_mode {
            custom.with_ussd_old_mode(true)
        } else {
            custom
        })
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
