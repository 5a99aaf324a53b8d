// ABOUTME: org.freedesktop.ModemManager.Modem.Gsm.Ussd: network-initiated and user-initiated USSD sessions
// ABOUTME: Initiate and Respond share the same exchange; State mirrors the session on the device

use super::DbusError;
use crate::wrapper::Wrapper;
use std::sync::Arc;
use zbus::interface;

pub struct UssdIface {
    wrapper: Arc<Wrapper>,
}

impl UssdIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

#[interface(name = "org.freedesktop.ModemManager.Modem.Gsm.Ussd")]
impl UssdIface {
    /// Start a session with `command`, returning the network's answer.
    async fn initiate(&self, command: String) -> Result<String, DbusError> {
        Ok(self.wrapper.send_ussd(&command).await?)
    }

    async fn respond(&self, response: String) -> Result<String, DbusError> {
        Ok(self.wrapper.send_ussd(&response).await?)
    }

    async fn cancel(&self) -> Result<(), DbusError> {
        Ok(self.wrapper.cancel_ussd().await?)
    }

    #[zbus(property)]
    fn state(&self) -> String {
        self.wrapper.ussd_state().as_str().to_string()
    }
}
