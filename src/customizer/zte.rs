// ABOUTME: ZTE family: +Z-prefixed notifications and +ZSNT network mode selection
// ABOUTME: Band selection is not offered; the radio always picks its own band

use super::{BoxFuture, Code, Customizer};
use crate::datatypes::{AllowedMode, NetworkMode};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{CommandEntry, Translation};
use crate::signals::{Capability, Signal};
use crate::wrapper::Wrapper;
use regex::Regex;

const ALLOWED_DICT: [(AllowedMode, Code); 5] = [
    (AllowedMode::Any, Code::Pair(0, 0)),
    (AllowedMode::TwoGOnly, Code::Pair(1, 0)),
    (AllowedMode::ThreeGOnly, Code::Pair(2, 0)),
    (AllowedMode::TwoGPreferred, Code::Pair(0, 1)),
    (AllowedMode::ThreeGPreferred, Code::Pair(0, 2)),
];

const CONN_DICT: [(NetworkMode, Code); 5] = [
    (NetworkMode::Any, Code::Pair(0, 0)),
    (NetworkMode::TwoGOnly, Code::Pair(1, 0)),
    (NetworkMode::ThreeGOnly, Code::Pair(2, 0)),
    (NetworkMode::TwoGPreferred, Code::Pair(0, 1)),
    (NetworkMode::ThreeGPreferred, Code::Pair(0, 2)),
];

/// Translate `+ZPASR: "<mode>"[,"<domain>"]`. "No Service" and
/// "Limited Service" come out as an unknown mode.
fn zte_conn_mode(args: &str) -> ModemResult<Option<Signal>> {
    let mode = args
        .split(',')
        .next()
        .map(|m| m.trim().trim_matches('"'))
        .unwrap_or_default();
    let mode = match mode {
        "GSM" | "GPRS" => NetworkMode::Gprs,
        "EDGE" => NetworkMode::Edge,
        "UMTS" => NetworkMode::Umts,
        "HSDPA" => NetworkMode::Hsdpa,
        "HSUPA" => NetworkMode::Hsupa,
        _ => NetworkMode::Unknown,
    };
    Ok(Some(Signal::NetworkMode(mode)))
}

fn zsnt(code: Code) -> ModemResult<String> {
    match code {
        Code::Pair(only, order) => Ok(format!("AT+ZSNT={},0,{}", only, order)),
        other => Err(ModemError::InvalidData(format!("bad +ZSNT code {:?}", other))),
    }
}

fn get_network_mode(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<NetworkMode>> {
    Box::pin(async move {
        let reply = wrapper.query("AT+ZSNT?", "get_network_mode").await?;
        let caps = reply.first()?;
        let code = Code::Pair(caps.parse("only")?, caps.parse("order")?);
        wrapper
            .custom()
            .conn_from_code(code)
            .ok_or_else(|| ModemError::InvalidData(format!("unknown +ZSNT setting {:?}", code)))
    })
}

fn set_network_mode(wrapper: &Wrapper, mode: NetworkMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let raw = zsnt(wrapper.custom().conn_code(mode)?)?;
        wrapper.send_at(&raw).await
    })
}

fn set_allowed_mode(wrapper: &Wrapper, mode: AllowedMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let raw = zsnt(wrapper.custom().allowed_code(mode)?)?;
        if wrapper.get_allowed_mode() == mode {
            return Ok(());
        }
        wrapper.send_at(&raw).await
    })
}

pub(super) fn customizer() -> ModemResult<Customizer> {
    let mut custom = Customizer::generic()?;
    custom.family = "zte";
    custom.async_regex = Some(Regex::new(r"\r\n(?P<signal>\+Z[A-Z]{3,}):\s*(?P<args>.*)\r\n")?);
    custom.allowed_dict = ALLOWED_DICT.to_vec();
    custom.conn_dict = CONN_DICT.to_vec();
    custom.capabilities = vec![Capability::NetworkMode, Capability::SmsNotifyOnline];

    custom.catalog.insert(
        "get_network_mode",
        CommandEntry::extract(r"\r\n\+ZSNT:\s(?P<only>\d+),(?P<netsel>\d+),(?P<order>\d+)\r\n")?,
    );

    custom.translate("+ZPASR", Translation::Transform(zte_conn_mode));
    for ignored in ["+ZDONR", "+ZUSIMR", "+ZPSTM", "+ZEND"] {
        custom.translate(ignored, Translation::Swallow);
    }

    custom.hooks.get_network_mode = Some(get_network_mode);
    custom.hooks.set_network_mode = Some(set_network_mode);
    custom.hooks.set_allowed_mode = Some(set_allowed_mode);

    // Older ZTE firmwares cannot route status reports as +CDS
    custom.sim_init = vec![
        "AT+CPMS=\"SM\",\"SM\",\"SM\"".to_string(),
        "AT+CNMI=2,1,0,2,0".to_string(),
    ];
    Ok(custom)
}
