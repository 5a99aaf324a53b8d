// ABOUTME: USSD sessions: send requests, decode replies and track the exported session state
// ABOUTME: Some older Huawei firmwares want requests as packed 7-bit GSM hex ("old mode")

use super::Wrapper;
use crate::datatypes::{Charset, ErrorKind, Interface, UssdState};
use crate::encoding::{
    decode_gsm7, encode_gsm7, hex_decode, hex_encode, pack_septets,
    pack_ucs2_bytes, unpack_septets, unpack_ucs2_bytes,
};
use crate::error::{ModemError, ModemResult};
use crate::protocol::Captures;
use tracing::debug;

/// Data coding scheme sent with every request: GSM 7-bit, language
/// unspecified.
const USSD_DCS: u32 = 15;
/// Data coding scheme announcing a UCS2 reply.
const DCS_UCS2: u32 = 72;

/// Carriage return used to pad a final septet.
const CR: u8 = 0x0D;

impl Wrapper {
    /// Send `request` and return the network's answer. The session moves
    /// to `user-response` when the network expects more input.
    pub async fn send_ussd(&self, request: &str) -> ModemResult<String> {
        let old_mode = self.custom.ussd_old_mode();
        let lease = self.lease_charset().await;
        let charset = lease.charset();
        let payload = if old_mode {
            encode_packed_gsm7(request)?
        } else if charset == Charset::Ucs2 {
            pack_ucs2_bytes(request)
        } else {
            request.to_string()
        };

        self.set_ussd_state(UssdState::Active);
        let raw = format!("AT+CUSD=1,\"{}\",{}", payload, USSD_DCS);
        let reply = match self.query(raw, "send_ussd").await {
            Ok(reply) => reply,
            Err(e) => {
                self.set_ussd_state(UssdState::Idle);
                return Err(e);
            }
        };

        let decoded = reply.first().and_then(|caps| {
            let state = if caps.str("index") == "1" {
                UssdState::UserResponse
            } else {
                UssdState::Idle
            };
            let text = if old_mode {
                decode_old_mode(caps)?
            } else {
                decode_reply(caps.str("resp"), charset)?
            };
            Ok((state, text))
        });
        match decoded {
            Ok((state, text)) => {
                debug!(state = state.as_str(), "USSD reply");
                self.set_ussd_state(state);
                Ok(text)
            }
            Err(e) => {
                self.set_ussd_state(UssdState::Idle);
                Err(e)
            }
        }
    }

    /// Abort the running session.
    pub async fn cancel_ussd(&self) -> ModemResult<()> {
        let result = self.query("AT+CUSD=2", "cancel_ussd").await.map(|_| ());
        self.set_ussd_state(UssdState::Idle);
        result
    }

    pub fn ussd_state(&self) -> UssdState {
        match self
            .board
            .property(Interface::Ussd, "State")
            .and_then(|v| v.as_str().map(String::from))
            .as_deref()
        {
            Some("active") => UssdState::Active,
            Some("user-response") => UssdState::UserResponse,
            _ => UssdState::Idle,
        }
    }

    fn set_ussd_state(&self, state: UssdState) {
        self.board
            .set_property(Interface::Ussd, "State", state.as_str());
    }
}

/// Some networks pad UCS2 replies with one NUL octet.
fn ucs2_payload(text: &str) -> &str {
    match text.strip_suffix("00") {
        Some(trimmed) if text.len() % 4 == 2 => trimmed,
        _ => text,
    }
}

/// Whether a reply is acceptable for a modem running `charset`: in UCS2
/// mode every reply must be UCS2 hex.
fn is_ucs2_reply(charset: Charset, text: &str) -> bool {
    charset != Charset::Ucs2 || unpack_ucs2_bytes(ucs2_payload(text)).is_ok()
}

fn malformed(text: &str) -> ModemError {
    ModemError::new(ErrorKind::MalformedUssdPdu, text)
}

fn decode_reply(resp: &str, charset: Charset) -> ModemResult<String> {
    if resp.is_empty() {
        return Ok(String::new());
    }
    if !is_ucs2_reply(charset, resp) {
        return Err(malformed(resp));
    }
    match charset {
        Charset::Ucs2 => unpack_ucs2_bytes(ucs2_payload(resp)).map_err(|_| malformed(resp)),
        _ => Ok(resp.to_string()),
    }
}

fn encode_packed_gsm7(request: &str) -> ModemResult<String> {
    let septets = encode_gsm7(request).ok_or_else(|| {
        ModemError::new(
            ErrorKind::CharsetError,
            format!("{:?} is not GSM 7-bit text", request),
        )
    })?;
    Ok(hex_encode(&pack_septets(&septets, 0)))
}

/// Old-mode replies come back as packed 7-bit hex, as UCS2 hex, or as
/// plain text, depending on firmware and network.
fn decode_old_mode(caps: &Captures) -> ModemResult<String> {
    let resp = caps.str("resp");
    if resp.is_empty() {
        return Ok(String::new());
    }
    let dcs: Option<u32> = caps.parse("dcs").ok();
    if dcs == Some(DCS_UCS2) {
        return unpack_ucs2_bytes(ucs2_payload(resp)).map_err(|_| malformed(resp));
    }
    match hex_decode(resp) {
        Some(octets) => {
            let mut septets = unpack_septets(&octets, octets.len() * 8 / 7, 0);
            if septets.len() % 8 == 0 && septets.last() == Some(&CR) {
                septets.pop();
            }
            Ok(decode_gsm7(&septets))
        }
        None => Ok(resp.to_string()),
    }
}
