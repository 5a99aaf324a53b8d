// ABOUTME: Icera family (ZTE Icera chipsets): %-prefixed notifications, %IPSYS modes, %IPDP NDIS data calls
// ABOUTME: Changing the bearer preference drops the radio, so it is only sent when it actually changes

use super::{BoxFuture, Code, Customizer};
use crate::datatypes::{AllowedAuth, AllowedMode, ErrorKind, IpMethod, NetworkMode};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{CommandEntry, Translation};
use crate::signals::{Capability, Signal};
use crate::wrapper::Wrapper;
use regex::Regex;

const ALLOWED_DICT: [(AllowedMode, Code); 5] = [
    (AllowedMode::Any, Code::Num(5)),
    (AllowedMode::TwoGOnly, Code::Num(0)),
    (AllowedMode::ThreeGOnly, Code::Num(1)),
    (AllowedMode::TwoGPreferred, Code::Num(2)),
    (AllowedMode::ThreeGPreferred, Code::Num(3)),
];

const CONN_DICT: [(NetworkMode, Code); 5] = [
    (NetworkMode::Any, Code::Num(5)),
    (NetworkMode::TwoGOnly, Code::Num(0)),
    (NetworkMode::ThreeGOnly, Code::Num(1)),
    (NetworkMode::TwoGPreferred, Code::Num(2)),
    (NetworkMode::ThreeGPreferred, Code::Num(3)),
];

/// `%IPDPACT` state reported when activation failed.
const ACTIVATION_FAILED: &str = "3";

/// `%NWSTATE: <rssi>,<plmn>,<tech>,<connected>,<regulation>`.
fn icera_conn_mode(args: &str) -> ModemResult<Option<Signal>> {
    let fields: Vec<&str> = args.split(',').map(str::trim).collect();
    let mode = match fields.get(2).copied() {
        Some("2G-GPRS") => NetworkMode::Gprs,
        Some("2G-EDGE") => NetworkMode::Edge,
        Some("3G") => NetworkMode::Umts,
        Some("3G-HSDPA") => NetworkMode::Hsdpa,
        Some("3G-HSUPA") => NetworkMode::Hsupa,
        Some("3G-HSDPA-HSUPA") => NetworkMode::Hspa,
        // "0", "2g", "3g": only circuit switched attached
        _ => NetworkMode::Unknown,
    };
    Ok(Some(Signal::NetworkMode(mode)))
}

/// `%IPDPACT: <cid>,<state>,...`. Only a failed activation is reported.
fn icera_connection_state(args: &str) -> ModemResult<Option<Signal>> {
    let args = args.replace(' ', "");
    let state = args.split(',').nth(1);
    if state == Some(ACTIVATION_FAILED) {
        return Ok(Some(Signal::Disconnected));
    }
    Ok(None)
}

fn code_num(code: Code) -> ModemResult<u32> {
    code.num()
        .ok_or_else(|| ModemError::InvalidData(format!("bad %IPSYS code {:?}", code)))
}

fn get_network_mode(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<NetworkMode>> {
    Box::pin(async move {
        let reply = wrapper.query("AT%IPSYS?", "get_network_mode").await?;
        let mode: u32 = reply.first()?.parse("mode")?;
        wrapper
            .custom()
            .conn_from_code(Code::Num(mode))
            .ok_or_else(|| ModemError::InvalidData(format!("unknown network mode {}", mode)))
    })
}

fn set_network_mode(wrapper: &Wrapper, mode: NetworkMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let code = code_num(wrapper.custom().conn_code(mode)?)?;
        if get_network_mode(wrapper).await? == mode {
            return Ok(());
        }
        wrapper.send_at(&format!("AT%IPSYS={}", code)).await
    })
}

fn set_allowed_mode(wrapper: &Wrapper, mode: AllowedMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let code = code_num(wrapper.custom().allowed_code(mode)?)?;
        if wrapper.get_allowed_mode() == mode {
            return Ok(());
        }
        wrapper.send_at(&format!("AT%IPSYS={}", code)).await
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
        let raw = format!(
            "AT%IPDPCFG={},0,{},\"{}\",\"{}\"",
            conn_id,
            AllowedAuth(auth).single_method(),
            user,
            password
        );
        wrapper.send_at(&raw).await
    })
}

fn connect(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        wrapper.send_at(&format!("AT%IPDPACT={},1", conn_id)).await
    })
}

fn disconnect(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        wrapper.send_at(&format!("AT%IPDPACT={},0", conn_id)).await
    })
}

fn get_ip4_config(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<Vec<String>>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        let reply = wrapper
            .query(format!("AT%IPDPADDR={}", conn_id), "get_ip4_config")
            .await?;
        let caps = reply
            .matches
            .first()
            .ok_or_else(|| ModemError::new(ErrorKind::General, "no %IPDPADDR yet"))?;
        let dns2 = caps.str("dns2").to_string();
        Ok(vec![
            caps.str("ip").to_string(),
            caps.str("dns1").to_string(),
            dns2.clone(),
            dns2,
        ])
    })
}

pub(super) fn customizer() -> ModemResult<Customizer> {
    let mut custom = Customizer::generic()?;
    custom.family = "icera";
    custom.async_regex = Some(Regex::new(r"\r\n(?P<signal>%[A-Z]{3,}):\s*(?P<args>.*)\r\n")?);
    custom.allowed_dict = ALLOWED_DICT.to_vec();
    custom.conn_dict = CONN_DICT.to_vec();
    custom.capabilities = vec![Capability::NetworkMode, Capability::SmsNotifyOnline];
    custom.ip_method = IpMethod::Static;
    custom.radio_off = 4;

    let catalog = &mut custom.catalog;
    catalog.insert(
        "list_sms",
        CommandEntry::extract(
            r#"\r\n\+CMGL:\s*(?P<id>\d+),(?P<where>\d),(?P<alpha>"\w*?")?,\d+\r\n(?P<pdu>\w+)"#,
        )?,
    );
    catalog.insert(
        "get_sms",
        CommandEntry::extract(r"\r\n\+CMGR:\s*(?P<where>\d+),(?P<contact>.*),\d+\r\n(?P<pdu>\w+)\r\n")?,
    );
    catalog.insert(
        "get_network_mode",
        CommandEntry::extract(r"%IPSYS:\s(?P<mode>\d+),(?P<domain>\d+)")?,
    );
    catalog.insert(
        "get_ip4_config",
        CommandEntry::extract(
            r"%IPDPADDR:\s*(?P<cid>\d+),\s*(?P<ip>[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+),\s*(?P<gw>[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+),\s*(?P<dns1>[0-9.]*),\s*(?P<dns2>[0-9.]*)",
        )?,
    );

    custom.translate("%NWSTATE", Translation::Transform(icera_conn_mode));
    custom.translate("%IPDPACT", Translation::Transform(icera_connection_state));

    custom.hooks.get_network_mode = Some(get_network_mode);
    custom.hooks.set_network_mode = Some(set_network_mode);
    custom.hooks.set_allowed_mode = Some(set_allowed_mode);
    custom.hooks.authenticate = Some(authenticate);
    custom.hooks.connect = Some(connect);
    custom.hooks.disconnect = Some(disconnect);
    custom.hooks.get_ip4_config = Some(get_ip4_config);

    custom.sim_init = vec![
        "AT+CPMS=\"SM\",\"SM\",\"SM\"".to_string(),
        "AT%NWSTATE=1".to_string(),
    ];
    Ok(custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ModemState;
    use crate::wrapper::testing::{drain, wrapper_with};

    #[test]
    fn test_nwstate() {
        assert_eq!(
            icera_conn_mode("4,23415,3G-HSDPA,-,0").unwrap(),
            Some(Signal::NetworkMode(NetworkMode::Hsdpa))
        );
        assert_eq!(
            icera_conn_mode("0,23415,2g,-,0").unwrap(),
            Some(Signal::NetworkMode(NetworkMode::Unknown))
        );
        assert_eq!(
            icera_conn_mode("").unwrap(),
            Some(Signal::NetworkMode(NetworkMode::Unknown))
        );
    }

    #[test]
    fn test_failed_activation() {
        assert_eq!(icera_connection_state("1, 3, 0").unwrap(), Some(Signal::Disconnected));
        assert_eq!(icera_connection_state("1,1").unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_network_mode_only_when_changed() {
        let (wrapper, mut seen) = wrapper_with(
            customizer().unwrap(),
            vec![("AT%IPSYS?", "\r\n%IPSYS: 1,2\r\n\r\nOK\r\n".into())],
        );
        wrapper.set_network_mode(NetworkMode::ThreeGOnly).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT%IPSYS?"]);
        wrapper.set_network_mode(NetworkMode::Any).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT%IPSYS?", "AT%IPSYS=5"]);
    }

    #[tokio::test]
    async fn test_failed_activation_aborts_ip_polling() {
        let (wrapper, _) = wrapper_with(
            customizer().unwrap(),
            vec![
                ("AT+CGDCONT?", "\r\nOK\r\n".into()),
                ("AT%IPDPADDR", "\r\nERROR\r\n".into()),
            ],
        );
        wrapper.set_status(ModemState::Registered);
        wrapper.set_apn("internet").await.unwrap();
        wrapper.connect_to_internet("").await.unwrap();
        // what the engine delivers for "%IPDPACT: 1,3,0"
        let failed = icera_connection_state("1,3,0").unwrap().unwrap();
        wrapper
            .handle_unsolicited(crate::protocol::Unsolicited::Signal(failed))
            .await;
        let err = wrapper.get_ip4_config().await.unwrap_err();
        assert!(err.is(ErrorKind::General));
        assert_eq!(wrapper.status(), ModemState::Registered);
    }
}
