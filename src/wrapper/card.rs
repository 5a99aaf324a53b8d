// ABOUTME: SIM and card operations: PIN handling, identity queries, charsets and radio power
// ABOUTME: Successful unlocks stamp the auth time the enable sequence waits on

use super::{Wrapper, lock, radio_command};
use crate::datatypes::{Charset, ErrorKind, Interface};
use crate::encoding::pack_ucs2_bytes;
use crate::error::{ModemError, ModemResult};
use crate::sim;
use tokio::time::Instant;
use tracing::{debug, info};

/// Manufacturer, model and firmware version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardInfo {
    pub manufacturer: String,
    pub model: String,
    pub version: String,
}

impl Wrapper {
    /// `READY`, or the lock the SIM is waiting on as an error.
    pub async fn check_pin(&self) -> ModemResult<String> {
        let reply = self.query("AT+CPIN?", "check_pin").await?;
        let resp = reply.first()?.str("resp").to_string();
        if resp == "READY" {
            return Ok(resp);
        }
        Err(ModemError::new(sim::cpin_error(&resp), resp))
    }

    /// Unlock with `pin`. The device needs the auth delay before it is
    /// initialised; callers do not wait for it here.
    pub async fn send_pin(&self, pin: &str) -> ModemResult<()> {
        self.query(format!("AT+CPIN=\"{}\"", pin), "send_pin").await?;
        self.unlocked();
        Ok(())
    }

    /// Send `pin` encoded as UCS2, for SIMs that only accept it so.
    pub async fn send_pin_ucs2(&self, pin: &str) -> ModemResult<()> {
        self.send_pin(&pack_ucs2_bytes(pin)).await
    }

    pub async fn send_puk(&self, puk: &str, pin: &str) -> ModemResult<()> {
        self.query(format!("AT+CPIN=\"{}\",\"{}\"", puk, pin), "send_puk")
            .await?;
        self.unlocked();
        Ok(())
    }

    fn unlocked(&self) {
        info!("SIM unlocked");
        self.board.set_property(Interface::Modem, "UnlockRequired", "");
        self.session().authtime = Some(Instant::now());
    }

    pub async fn change_pin(&self, old: &str, new: &str) -> ModemResult<()> {
        self.query(format!("AT+CPWD=\"SC\",\"{}\",\"{}\"", old, new), "change_pin")
            .await
            .map(|_| ())
    }

    /// Turn PIN checking on or off, caching the result in `PinEnabled`.
    pub async fn enable_pin(&self, pin: &str, enable: bool) -> ModemResult<()> {
        self.query(
            format!("AT+CLCK=\"SC\",{},\"{}\"", u8::from(enable), pin),
            "enable_pin",
        )
        .await?;
        self.board.set_property(Interface::Card, "PinEnabled", enable);
        Ok(())
    }

    /// Whether PIN checking is active. A SIM still asking for its PIN
    /// obviously has it enabled.
    pub async fn get_pin_status(&self) -> ModemResult<bool> {
        match self.query("AT+CLCK=\"SC\",2", "get_pin_status").await {
            Ok(reply) => Ok(reply.first()?.parse::<u32>("status")? == 1),
            Err(e) if e.is(ErrorKind::SimPinRequired) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub async fn get_imei(&self) -> ModemResult<String> {
        let reply = self.query("AT+CGSN", "get_imei").await?;
        Ok(reply.first()?.str("imei").to_string())
    }

    pub async fn get_imsi(&self) -> ModemResult<String> {
        let reply = self.query("AT+CIMI", "get_imsi").await?;
        Ok(reply.first()?.str("imsi").to_string())
    }

    pub async fn get_manufacturer_name(&self) -> ModemResult<String> {
        let reply = self.query("AT+GMI", "get_manufacturer_name").await?;
        Ok(reply.first()?.str("name").trim().to_string())
    }

    pub async fn get_card_model(&self) -> ModemResult<String> {
        let reply = self.query("AT+CGMM", "get_card_model").await?;
        Ok(reply.first()?.str("model").trim().to_string())
    }

    pub async fn get_card_version(&self) -> ModemResult<String> {
        let reply = self.query("AT+CGMR", "get_card_version").await?;
        Ok(reply.first()?.str("version").trim().to_string())
    }

    pub async fn get_info(&self) -> ModemResult<CardInfo> {
        Ok(CardInfo {
            manufacturer: self.get_manufacturer_name().await?,
            model: self.get_card_model().await?,
            version: self.get_card_version().await?,
        })
    }

    /// Charset the modem currently reports.
    pub async fn get_charset(&self) -> ModemResult<String> {
        let reply = self.query("AT+CSCS?", "get_charset").await?;
        Ok(reply.first()?.str("lang").to_string())
    }

    /// Charsets the modem supports. Names this daemon cannot speak are
    /// skipped.
    pub async fn get_charsets(&self) -> ModemResult<Vec<Charset>> {
        let reply = self.query("AT+CSCS=?", "get_charsets").await?;
        let charsets = reply
            .matches
            .iter()
            .filter_map(|caps| caps.str("lang").parse::<Charset>().ok())
            .collect();
        Ok(charsets)
    }

    /// Switch the modem to `charset` and remember it.
    pub async fn set_charset(&self, charset: Charset) -> ModemResult<()> {
        self.switch_charset(charset).await?;
        debug!(%charset, "charset selected");
        Ok(())
    }

    /// `true` when the radio is powered.
    pub async fn get_radio_status(&self) -> ModemResult<bool> {
        let reply = self.query("AT+CFUN?", "get_radio_status").await?;
        let status: u32 = reply.first()?.parse("status")?;
        Ok(status != 0 && status != self.custom.radio_off())
    }

    /// Power the radio on or off unless it already is.
    pub async fn enable_radio(&self, enable: bool) -> ModemResult<()> {
        if enable && self.status().is_enabled() {
            return Ok(());
        }
        if self.get_radio_status().await? == enable {
            debug!(enable, "radio already in requested state");
            return Ok(());
        }
        let level = if enable { 1 } else { self.custom.radio_off() };
        let raw = format!("AT+CFUN={}", level);
        self.send(radio_command(raw, "enable_radio")).await?;
        Ok(())
    }

    pub async fn enable_echo(&self, enable: bool) -> ModemResult<()> {
        let (raw, name) = if enable {
            ("ATE1", "enable_echo")
        } else {
            ("ATE0", "disable_echo")
        };
        self.query(raw, name).await.map(|_| ())
    }

    pub async fn reset_settings(&self) -> ModemResult<()> {
        self.query("ATZ", "reset_settings").await.map(|_| ())
    }

    /// Phonebook capacity as reported by `+CPBR=?`.
    pub async fn get_phonebook_size(&self) -> ModemResult<u32> {
        let reply = self.query("AT+CPBR=?", "get_phonebook_size").await?;
        let size = reply.first()?.parse("size")?;
        lock(&self.sim).size = Some(size);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::datatypes::{Charset, ErrorKind, Interface};

    #[tokio::test]
    async fn test_check_pin_states() {
        let (wrapper, _) = scripted(vec![("AT+CPIN?", "\r\n+CPIN: SIM PUK\r\n\r\nOK\r\n".into())]);
        let err = wrapper.check_pin().await.unwrap_err();
        assert!(err.is(ErrorKind::SimPukRequired));

        let (wrapper, _) = scripted(vec![("AT+CPIN?", "\r\n+CPIN: READY\r\n\r\nOK\r\n".into())]);
        assert_eq!(wrapper.check_pin().await.unwrap(), "READY");
    }

    #[tokio::test]
    async fn test_send_pin_clears_unlock_required() {
        let (wrapper, mut seen) = scripted(vec![]);
        wrapper
            .board()
            .set_property(Interface::Modem, "UnlockRequired", "sim-pin");
        wrapper.send_pin("1234").await.unwrap();

        assert_eq!(drain(&mut seen), vec!["AT+CPIN=\"1234\""]);
        assert_eq!(
            wrapper
                .board()
                .property(Interface::Modem, "UnlockRequired")
                .and_then(|v| v.as_str().map(String::from)),
            Some(String::new())
        );
        assert!(wrapper.authtime().is_some());
    }

    #[tokio::test]
    async fn test_pin_status_while_locked() {
        let (wrapper, _) = scripted(vec![("AT+CLCK", "\r\n+CME ERROR: 11\r\n".into())]);
        assert!(wrapper.get_pin_status().await.unwrap());

        let (wrapper, _) = scripted(vec![("AT+CLCK", "\r\n+CLCK: 0\r\n\r\nOK\r\n".into())]);
        assert!(!wrapper.get_pin_status().await.unwrap());
    }

    #[tokio::test]
    async fn test_enable_pin_caches_property() {
        let (wrapper, mut seen) = scripted(vec![]);
        wrapper.enable_pin("0000", true).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT+CLCK=\"SC\",1,\"0000\""]);
        assert_eq!(
            wrapper
                .board()
                .property(Interface::Card, "PinEnabled")
                .and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_charsets_skip_unknown_names() {
        let (wrapper, _) = scripted(vec![(
            "AT+CSCS=?",
            "\r\n+CSCS: (\"IRA\",\"GSM\",\"8859-1\",\"UCS2\")\r\n\r\nOK\r\n".into(),
        )]);
        let charsets = wrapper.get_charsets().await.unwrap();
        assert_eq!(charsets, vec![Charset::Ira, Charset::Gsm, Charset::Ucs2]);
    }

    #[tokio::test]
    async fn test_enable_radio_skips_when_already_on() {
        let (wrapper, mut seen) =
            scripted(vec![("AT+CFUN?", "\r\n+CFUN: 1\r\n\r\nOK\r\n".into())]);
        wrapper.enable_radio(true).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT+CFUN?"]);

        wrapper.enable_radio(false).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT+CFUN?", "AT+CFUN=0"]);
    }

    #[tokio::test]
    async fn test_card_info() {
        let (wrapper, _) = scripted(vec![
            ("AT+GMI", "\r\nhuawei\r\n\r\nOK\r\n".into()),
            ("AT+CGMM", "\r\nE220\r\n\r\nOK\r\n".into()),
            ("AT+CGMR", "\r\n11.117.09.04.00\r\n\r\nOK\r\n".into()),
        ]);
        let info = wrapper.get_info().await.unwrap();
        assert_eq!(info.manufacturer, "huawei");
        assert_eq!(info.model, "E220");
        assert_eq!(info.version, "11.117.09.04.00");
    }
}
