// ABOUTME: org.freedesktop.ModemManager.Modem.Gsm.Card: PIN handling, identity and charset
// ABOUTME: Also exports the supported bands and modes of the device family

use super::{DbusError, bool_prop, u32_prop};
use crate::datatypes::{Charset, Interface};
use crate::wrapper::Wrapper;
use std::sync::Arc;
use zbus::interface;

pub struct CardIface {
    wrapper: Arc<Wrapper>,
}

impl CardIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

#[interface(name = "org.freedesktop.ModemManager.Modem.Gsm.Card")]
impl CardIface {
    async fn send_pin(&self, pin: String) -> Result<(), DbusError> {
        Ok(self.wrapper.send_pin(&pin).await?)
    }

    async fn send_puk(&self, puk: String, pin: String) -> Result<(), DbusError> {
        Ok(self.wrapper.send_puk(&puk, &pin).await?)
    }

    async fn enable_pin(&self, pin: String, enable: bool) -> Result<(), DbusError> {
        Ok(self.wrapper.enable_pin(&pin, enable).await?)
    }

    async fn change_pin(&self, old_pin: String, new_pin: String) -> Result<(), DbusError> {
        Ok(self.wrapper.change_pin(&old_pin, &new_pin).await?)
    }

    async fn get_imei(&self) -> Result<String, DbusError> {
        Ok(self.wrapper.get_imei().await?)
    }

    async fn get_imsi(&self) -> Result<String, DbusError> {
        Ok(self.wrapper.get_imsi().await?)
    }

    async fn get_charset(&self) -> Result<String, DbusError> {
        Ok(self.wrapper.get_charset().await?)
    }

    async fn set_charset(&self, charset: String) -> Result<(), DbusError> {
        let charset: Charset = charset.parse().map_err(DbusError::input)?;
        Ok(self.wrapper.set_charset(charset).await?)
    }

    async fn get_charsets(&self) -> Result<Vec<String>, DbusError> {
        let charsets = self.wrapper.get_charsets().await?;
        Ok(charsets.iter().map(|c| c.as_str().to_string()).collect())
    }

    /// Authentication state of the SIM, `READY` once unlocked.
    async fn check(&self) -> Result<String, DbusError> {
        Ok(self.wrapper.check_pin().await?)
    }

    #[zbus(property)]
    fn supported_bands(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Card, "SupportedBands")
    }

    #[zbus(property)]
    fn supported_modes(&self) -> u32 {
        u32_prop(&self.wrapper, Interface::Card, "SupportedModes")
    }

    #[zbus(property)]
    fn pin_enabled(&self) -> bool {
        bool_prop(&self.wrapper, Interface::Card, "PinEnabled")
    }
}
