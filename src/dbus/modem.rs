// ABOUTME: org.freedesktop.ModemManager.Modem: enable, dial, hang up and the device properties
// ABOUTME: Property values come from the device's status board

use super::{DbusError, bool_prop, str_prop, u32_prop};
use crate::datatypes::Interface;
use crate::wrapper::Wrapper;
use std::sync::Arc;
use tracing::info;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub struct ModemIface {
    wrapper: Arc<Wrapper>,
}

impl ModemIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

#[interface(name = "org.freedesktop.ModemManager.Modem")]
impl ModemIface {
    async fn enable(&self, enable: bool) -> Result<(), DbusError> {
        info!(enable, "Enable");
        if enable {
            self.wrapper.enable_device().await?;
        } else {
            self.wrapper.disable_device().await?;
        }
        Ok(())
    }

    async fn connect(&self, number: String) -> Result<(), DbusError> {
        Ok(self.wrapper.connect_to_internet(&number).await?)
    }

    async fn disconnect(&self) -> Result<(), DbusError> {
        Ok(self.wrapper.disconnect_from_internet().await?)
    }

    /// Manufacturer, model and firmware revision.
    async fn get_info(&self) -> Result<(String, String, String), DbusError> {
        let info = self.wrapper.get_info().await?;
        Ok((info.manufacturer, info.model, info.version))
    }

    /// Address and DNS servers of an NDIS call.
    #[zbus(name = "GetIP4Config")]
    async fn get_ip4_config(&self) -> Result<Vec<String>, DbusError> {
        Ok(self.wrapper.get_ip4_config().await?)
    }

    #[zbus(signal, name = "StateChanged")]
    pub async fn modem_state_changed(
        emitter: &SignalEmitter<'_>,
        old: u32,
        new: u32,
        reason: u32,
    ) -> zbus::Result<()>;

    #[zbus(property)]
    fn device(&self) -> String {
        str_prop(&self.wrapper, Interface::Modem, "Device")
    }

    #[zbus(property)]
    fn driver(&self) -> String {
        str_prop(&self.wrapper, Interface::Modem, "Driver")
    }

    #[zbus(property, name = "Type")]
    fn modem_type(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Modem, "Type")
    }

    #[zbus(property)]
    fn ip_method(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Modem, "IpMethod")
    }

    #[zbus(property)]
    fn equipment_identifier(&self) -> String {
        str_prop(&self.wrapper, Interface::Modem, "EquipmentIdentifier")
    }

    #[zbus(property)]
    fn unlock_required(&self) -> String {
        str_prop(&self.wrapper, Interface::Modem, "UnlockRequired")
    }

    #[zbus(property)]
    fn unlock_retries(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Modem, "UnlockRetries")
    }

    #[zbus(property)]
    fn enabled(&self) -> bool {
        bool_prop(&self.wrapper, Interface::Modem, "Enabled")
    }

    #[zbus(property)]
    fn state(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Modem, "State")
    }
}
