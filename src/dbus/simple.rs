// ABOUTME: org.freedesktop.ModemManager.Modem.Simple: one-call connect and a status snapshot
// ABOUTME: Translates a{sv} dictionaries to and from the simple connect settings

use super::{DbusError, Dict, dict_str, dict_u32};
use crate::datatypes::{Band, NetworkMode};
use crate::machines::SimpleSettings;
use crate::wrapper::{SimpleStatus, Wrapper};
use std::collections::HashMap;
use std::sync::Arc;
use zbus::interface;
use zbus::zvariant::{OwnedValue, Value};

pub struct SimpleIface {
    wrapper: Arc<Wrapper>,
}

impl SimpleIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

fn settings_from_dict(
    dict: &HashMap<String, OwnedValue>,
) -> Result<SimpleSettings, DbusError> {
    let text = |key: &str| dict_str(dict, key).map(str::to_string);
    let network_mode = match dict_u32(dict, "network_mode") {
        Some(mode) => Some(
            NetworkMode::try_from(mode)
                .map_err(|_| DbusError::input(format!("unknown network mode {:#x}", mode)))?,
        ),
        None => None,
    };
    Ok(SimpleSettings {
        pin: text("pin"),
        apn: text("apn"),
        band: dict_u32(dict, "band").map(Band),
        network_mode,
        network_id: text("network_id"),
        number: text("number"),
        username: text("username"),
        password: text("password"),
    })
}

fn status_dict(status: SimpleStatus) -> Dict {
    let mut dict = Dict::from([("state".to_string(), Value::from(status.state as u32))]);
    if let Some(reg) = status.registered {
        dict.insert("signal_quality".to_string(), Value::from(reg.signal_quality));
        dict.insert("operator_code".to_string(), Value::from(reg.operator_code));
        dict.insert("operator_name".to_string(), Value::from(reg.operator_name));
        dict.insert("band".to_string(), Value::from(reg.band.bits()));
        dict.insert("network_mode".to_string(), Value::from(reg.network_mode as u32));
    }
    dict
}

#[interface(name = "org.freedesktop.ModemManager.Modem.Simple")]
impl SimpleIface {
    /// Unlock, register, configure and dial in one go.
    async fn connect(&self, properties: HashMap<String, OwnedValue>) -> Result<(), DbusError> {
        let settings = settings_from_dict(&properties)?;
        Ok(self.wrapper.connect_simple(settings).await?)
    }

    async fn get_status(&self) -> Result<Dict, DbusError> {
        Ok(status_dict(self.wrapper.get_simple_status().await?))
    }
}
