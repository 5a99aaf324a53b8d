// ABOUTME: org.freedesktop.ModemManager.Modem.Gsm.Network: registration, scans, bands, modes and APNs
// ABOUTME: Declares the registration, mode and signal quality signals re-emitted from the device

use super::{DbusError, u32_prop};
use crate::datatypes::{AllowedMode, Band, Interface, NetworkMode};
use crate::machines;
use crate::wrapper::Wrapper;
use std::collections::HashMap;
use std::sync::Arc;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub struct NetworkIface {
    wrapper: Arc<Wrapper>,
}

impl NetworkIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

#[interface(name = "org.freedesktop.ModemManager.Modem.Gsm.Network")]
impl NetworkIface {
    /// Register with `netid`, or with whatever network the device picks
    /// when it is empty.
    async fn register(&self, netid: String) -> Result<(), DbusError> {
        Ok(machines::register(&self.wrapper, &netid).await?)
    }

    async fn scan(&self) -> Result<Vec<HashMap<String, String>>, DbusError> {
        let operators = self.wrapper.get_network_names().await?;
        Ok(operators
            .into_iter()
            .map(|op| {
                let mut entry = HashMap::from([
                    ("status".to_string(), op.status.to_string()),
                    ("operator-long".to_string(), op.long_name),
                    ("operator-short".to_string(), op.short_name),
                    ("operator-num".to_string(), op.netid),
                ]);
                if op.access_tech as u32 != 0 {
                    entry.insert(
                        "access-tech".to_string(),
                        (op.access_tech as u32).to_string(),
                    );
                }
                entry
            })
            .collect())
    }

    async fn get_band(&self) -> Result<u32, DbusError> {
        Ok(self.wrapper.get_band().await?.bits())
    }

    async fn set_band(&self, band: u32) -> Result<(), DbusError> {
        Ok(self.wrapper.set_band(Band(band)).await?)
    }

    async fn set_allowed_mode(&self, mode: u32) -> Result<(), DbusError> {
        let mode = AllowedMode::try_from(mode)
            .map_err(|_| DbusError::input(format!("unknown allowed mode {}", mode)))?;
        Ok(self.wrapper.set_allowed_mode(mode).await?)
    }

    async fn get_network_mode(&self) -> Result<u32, DbusError> {
        Ok(self.wrapper.get_network_mode().await? as u32)
    }

    async fn set_network_mode(&self, mode: u32) -> Result<(), DbusError> {
        let mode = NetworkMode::try_from(mode)
            .map_err(|_| DbusError::input(format!("unknown network mode {:#x}", mode)))?;
        Ok(self.wrapper.set_network_mode(mode).await?)
    }

    async fn get_signal_quality(&self) -> Result<u32, DbusError> {
        Ok(self.wrapper.get_signal_quality().await?)
    }

    async fn get_registration_info(&self) -> Result<(u32, String, String), DbusError> {
        let info = self.wrapper.get_netreg_info().await?;
        Ok((info.status as u32, info.operator_code, info.operator_name))
    }

    async fn set_apn(&self, apn: String) -> Result<(), DbusError> {
        Ok(self.wrapper.set_apn(&apn).await?)
    }

    /// Defined PDP contexts as `(context id, APN)`.
    async fn get_apns(&self) -> Result<Vec<(u32, String)>, DbusError> {
        Ok(self.wrapper.get_apns().await?)
    }

    #[zbus(name = "GetRoamingIDs")]
    async fn get_roaming_ids(&self) -> Result<Vec<String>, DbusError> {
        Ok(self.wrapper.get_roaming_ids().await?)
    }

    #[zbus(signal)]
    pub async fn registration_info(
        emitter: &SignalEmitter<'_>,
        status: u32,
        operator_code: &str,
        operator_name: &str,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn network_mode(emitter: &SignalEmitter<'_>, mode: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn signal_quality(emitter: &SignalEmitter<'_>, quality: u32) -> zbus::Result<()>;

    #[zbus(property)]
    fn allowed_mode(&self) -> u32 {
        self.wrapper.get_allowed_mode() as u32
    }

    #[zbus(property)]
    fn access_technology(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Network, "AccessTechnology")
    }
}
