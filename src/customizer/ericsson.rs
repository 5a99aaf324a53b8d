// ABOUTME: Ericsson MBM family: NDIS data calls through *ENAP, *E2IPCFG addressing and +CIND signal levels
// ABOUTME: Network mode maps onto AT+CFUN levels; AT+CFUN=4 is the radio-off level

use super::{BoxFuture, Code, Customizer};
use crate::datatypes::{AllowedAuth, AllowedMode, Band, ErrorKind, IpMethod, NetworkMode};
use crate::encoding::{encode_text, from_ucs2};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{Captures, CommandEntry, Translation, arg};
use crate::signals::{Capability, Signal};
use crate::wrapper::Wrapper;
use regex::Regex;

/// `+CIND` and `+CIEV` report signal as 0-5.
const SIGNAL_STEP: u32 = 20;
/// `+CIEV` indicator carrying the signal level.
const SIGNAL_INDICATOR: u32 = 2;

/// DNS servers handed out when the device reports none.
const FALLBACK_DNS: [&str; 2] = ["10.11.12.13", "10.11.12.14"];

const ALLOWED_DICT: [(AllowedMode, Code); 3] = [
    (AllowedMode::Any, Code::Num(1)),
    (AllowedMode::TwoGOnly, Code::Num(5)),
    (AllowedMode::ThreeGOnly, Code::Num(6)),
];

const CONN_DICT: [(NetworkMode, Code); 3] = [
    (NetworkMode::Any, Code::Num(1)),
    (NetworkMode::TwoGOnly, Code::Num(5)),
    (NetworkMode::ThreeGOnly, Code::Num(6)),
];

const E2IPCFG: &str = r#"\*E2IPCFG:\s*(?:\((?P<t1>\d+),"(?P<v1>\d+\.\d+\.\d+\.\d+|[\dA-Fa-f]+)"\))(?:\((?P<t2>\d+),"(?P<v2>\d+\.\d+\.\d+\.\d+|[\dA-Fa-f]+)"\))?(?:\((?P<t3>\d+),"(?P<v3>\d+\.\d+\.\d+\.\d+|[\dA-Fa-f]+)"\))?(?:\((?P<t4>\d+),"(?P<v4>\d+\.\d+\.\d+\.\d+|[\dA-Fa-f]+)"\))?"#;

/// `+CIEV: <indicator>,<value>`. Only the signal indicator is reported.
fn ericsson_indication(args: &str) -> ModemResult<Option<Signal>> {
    let indicator: u32 = arg(args, 0)?;
    if indicator != SIGNAL_INDICATOR {
        return Ok(None);
    }
    let value: u32 = arg(args, 1)?;
    Ok(Some(Signal::SignalQuality(value * SIGNAL_STEP)))
}

/// `*E2NAP: <state>`: 0 link down, 1 link up, 2 still connecting.
fn ericsson_link_state(args: &str) -> ModemResult<Option<Signal>> {
    match arg::<u32>(args, 0)? {
        0 => Ok(Some(Signal::Disconnected)),
        1 => Ok(Some(Signal::Connected)),
        _ => Ok(None),
    }
}

/// Pull `[ip, dns1, dns2, dns3]` out of a `*E2IPCFG` reply. Type 1 is the
/// address and type 3 a name server; values may come UCS2 encoded.
fn parse_ip4_config(caps: &Captures) -> ModemResult<Vec<String>> {
    let mut ip = None;
    let mut dns = Vec::new();
    for i in 1..=4 {
        let (Some(kind), Some(value)) = (caps.get(&format!("t{}", i)), caps.get(&format!("v{}", i)))
        else {
            continue;
        };
        let value = if value.contains('.') {
            value.to_string()
        } else {
            from_ucs2(value)
        };
        match kind {
            "1" => ip = Some(value),
            "3" => dns.push(value),
            _ => {}
        }
    }
    let ip = ip.ok_or_else(|| ModemError::new(ErrorKind::General, "no address yet"))?;
    if dns.is_empty() {
        dns = FALLBACK_DNS.iter().map(|s| s.to_string()).collect();
    }
    while dns.len() < 3 {
        dns.push(dns[0].clone());
    }
    dns.truncate(3);
    Ok(std::iter::once(ip).chain(dns).collect())
}

/// `*EIAAUW` wants the allowed methods as five binary digits:
/// MSCHAPv2, MSCHAP, CHAP, PAP, none.
fn auth_bits(auth: AllowedAuth) -> String {
    let mut bits = auth.bits() & 0x1f;
    if bits == AllowedAuth::UNKNOWN.bits() {
        bits = AllowedAuth::PAP.bits();
    }
    format!("{:05b}", bits)
}

fn cfun(code: Code) -> ModemResult<String> {
    match code {
        Code::Num(level) => Ok(format!("AT+CFUN={}", level)),
        other => Err(ModemError::InvalidData(format!("bad +CFUN code {:?}", other))),
    }
}

fn get_signal_quality(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<u32>> {
    Box::pin(async move {
        let reply = wrapper.query("AT+CIND?", "get_signal_quality").await?;
        // No +CIND line at all means no signal right now
        match reply.matches.first() {
            Some(caps) => Ok(caps.parse::<u32>("sig")? * SIGNAL_STEP),
            None => Ok(0),
        }
    })
}

fn get_network_mode(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<NetworkMode>> {
    Box::pin(async move {
        let reply = wrapper.query("AT+CFUN?", "get_radio_status").await?;
        let level: u32 = reply.first()?.parse("status")?;
        wrapper
            .custom()
            .conn_from_code(Code::Num(level))
            .ok_or_else(|| {
                ModemError::new(
                    ErrorKind::General,
                    format!("unknown network mode: {}", level),
                )
            })
    })
}

fn set_network_mode(wrapper: &Wrapper, mode: NetworkMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move { wrapper.send_at(&cfun(wrapper.custom().conn_code(mode)?)?).await })
}

fn set_allowed_mode(wrapper: &Wrapper, mode: AllowedMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let raw = cfun(wrapper.custom().allowed_code(mode)?)?;
        if wrapper.get_allowed_mode() == mode {
            return Ok(());
        }
        wrapper.send_at(&raw).await
    })
}

fn authenticate(
    wrapper: &Wrapper,
    user: String,
    password: String,
    auth: u32,
) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        let lease = wrapper.lease_charset().await;
        let charset = lease.charset();
        let raw = format!(
            "AT*EIAAUW={},1,\"{}\",\"{}\",{}",
            conn_id,
            encode_text(&user, charset),
            encode_text(&password, charset),
            auth_bits(AllowedAuth(auth))
        );
        wrapper.send_at(&raw).await
    })
}

fn connect(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        wrapper.send_at(&format!("AT*ENAP=1,{}", conn_id)).await
    })
}

fn disconnect(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move { wrapper.send_at("AT*ENAP=0").await })
}

fn get_ip4_config(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<Vec<String>>> {
    Box::pin(async move {
        let reply = wrapper.query("AT*E2IPCFG?", "get_ip4_config").await?;
        let caps = reply
            .matches
            .first()
            .ok_or_else(|| ModemError::new(ErrorKind::General, "no *E2IPCFG yet"))?;
        parse_ip4_config(caps)
    })
}

pub(super) fn customizer() -> ModemResult<Customizer> {
    let mut custom = Customizer::generic()?;
    custom.family = "ericsson";
    custom.async_regex = Some(Regex::new(r"\r\n(?P<signal>[*+][A-Z][A-Z0-9]{2,}):(?P<args>.*)\r\n")?);
    custom.band_dict = vec![(Band::ANY, Code::Num(0))];
    custom.allowed_dict = ALLOWED_DICT.to_vec();
    custom.conn_dict = CONN_DICT.to_vec();
    custom.capabilities = vec![Capability::SmsNotifyOnline, Capability::SignalQuality];
    custom.ip_method = IpMethod::Static;
    custom.radio_off = 4;

    custom
        .catalog
        .insert("get_card_model", CommandEntry::extract(r"\s*(?P<model>\S*)\r\n")?);
    custom.catalog.insert(
        "get_signal_quality",
        CommandEntry::extract(r"\s*\+CIND:\s+[0-9]*,(?P<sig>[0-9]*),.*")?,
    );
    custom.catalog.insert(
        "get_phonebook_size",
        CommandEntry::extract(r"\r\n\+CPBR:\s\(\d-(?P<size>\d+)\)(?P<ignored>,.*)?\r\n")?,
    );
    custom
        .catalog
        .insert("get_ip4_config", CommandEntry::extract(E2IPCFG)?);

    custom.translate("+CIEV", Translation::Transform(ericsson_indication));
    custom.translate("*E2NAP", Translation::Transform(ericsson_link_state));
    for ignored in ["*ESTKDISP", "*ESTKSMENU", "*EMWI", "+PACSP0"] {
        custom.translate(ignored, Translation::Swallow);
    }

    custom.hooks.get_signal_quality = Some(get_signal_quality);
    custom.hooks.get_network_mode = Some(get_network_mode);
    custom.hooks.set_network_mode = Some(set_network_mode);
    custom.hooks.set_allowed_mode = Some(set_allowed_mode);
    custom.hooks.authenticate = Some(authenticate);
    custom.hooks.connect = Some(connect);
    custom.hooks.disconnect = Some(disconnect);
    custom.hooks.get_ip4_config = Some(get_ip4_config);

    custom.sim_init = vec![
        "AT+CPBS=\"SM\"".to_string(),
        "AT+CPMS=\"SM\",\"SM\",\"SM\"".to_string(),
        "AT+CMER=3,0,0,1".to_string(),
    ];
    Ok(custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ModemState;
    use crate::wrapper::testing::{drain, wrapper_with};

    #[test]
    fn test_ciev_signal_only() {
        assert_eq!(
            ericsson_indication("2,4").unwrap(),
            Some(Signal::SignalQuality(80))
        );
        assert_eq!(ericsson_indication("9,1").unwrap(), None);
        assert!(ericsson_indication("x").is_err());
    }

    #[test]
    fn test_link_state() {
        assert_eq!(ericsson_link_state("0").unwrap(), Some(Signal::Disconnected));
        assert_eq!(ericsson_link_state("1").unwrap(), Some(Signal::Connected));
        assert_eq!(ericsson_link_state("2").unwrap(), None);
    }

    #[test]
    fn test_auth_bits() {
        assert_eq!(auth_bits(AllowedAuth::UNKNOWN), "00010");
        assert_eq!(auth_bits(AllowedAuth::CHAP), "00100");
        assert_eq!(auth_bits(AllowedAuth(0xff)), "11111");
    }

    #[test]
    fn test_ip4_config_padding() {
        let caps = Captures::from_pairs(&[("t1", "1"), ("v1", "10.0.0.5"), ("t2", "3"), ("v2", "8.8.8.8")]);
        assert_eq!(
            parse_ip4_config(&caps).unwrap(),
            vec!["10.0.0.5", "8.8.8.8", "8.8.8.8", "8.8.8.8"]
        );

        let caps = Captures::from_pairs(&[("t1", "1"), ("v1", "00310030002E0030002E0030002E0037")]);
        assert_eq!(
            parse_ip4_config(&caps).unwrap(),
            vec!["10.0.0.7", "10.11.12.13", "10.11.12.14", "10.11.12.13"]
        );

        let caps = Captures::from_pairs(&[("t1", "2"), ("v1", "10.0.0.1")]);
        assert!(parse_ip4_config(&caps).is_err());
    }

    #[tokio::test]
    async fn test_ndis_call() {
        let (wrapper, mut seen) = wrapper_with(
            customizer().unwrap(),
            vec![
                ("AT+CGDCONT?", "\r\n+CGDCONT: 2,\"IP\",\"internet\",\"0.0.0.0\",0,0\r\n\r\nOK\r\n".into()),
                (
                    "AT*E2IPCFG?",
                    "\r\n*E2IPCFG: (1,\"10.0.0.5\")(2,\"10.0.0.1\")(3,\"192.168.1.1\")(3,\"192.168.1.2\")\r\n\r\nOK\r\n".into(),
                ),
            ],
        );
        wrapper.set_status(ModemState::Registered);
        wrapper.set_apn("internet").await.unwrap();
        let hooks = *wrapper.custom().hooks();
        (hooks.authenticate.unwrap())(&wrapper, "web".into(), "pw".into(), AllowedAuth::CHAP.bits())
            .await
            .unwrap();
        wrapper.connect_to_internet("").await.unwrap();
        let config = wrapper.get_ip4_config().await.unwrap();
        assert_eq!(config, vec!["10.0.0.5", "192.168.1.1", "192.168.1.2", "192.168.1.1"]);
        assert_eq!(wrapper.status(), ModemState::Connected);

        wrapper.disconnect_from_internet().await.unwrap();
        assert_eq!(wrapper.status(), ModemState::Registered);
        assert_eq!(
            drain(&mut seen),
            vec![
                "AT+CGDCONT?",
                "AT*EIAAUW=2,1,\"web\",\"pw\",00100",
                "AT*ENAP=1,2",
                "AT*E2IPCFG?",
                "AT*ENAP=0",
            ]
        );
    }

    #[tokio::test]
    async fn test_network_mode_via_cfun() {
        let (wrapper, mut seen) = wrapper_with(
            customizer().unwrap(),
            vec![("AT+CFUN?", "\r\n+CFUN: 6\r\n\r\nOK\r\n".into())],
        );
        assert_eq!(wrapper.get_network_mode().await.unwrap(), NetworkMode::ThreeGOnly);
        assert!(wrapper.get_radio_status().await.unwrap());
        wrapper.set_allowed_mode(AllowedMode::TwoGOnly).await.unwrap();
        assert_eq!(drain(&mut seen).last().unwrap(), "AT+CFUN=5");
    }
}
