// ABOUTME: Option family: _O-prefixed notifications, _OPBM band and _OPSYS mode selection, _OBLS SIM polling
// ABOUTME: The HSO variant adds NDIS calls through _OWANCALL and addressing through _OWANDATA

use super::{BoxFuture, Code, Customizer};
use crate::datatypes::{
    AllowedAuth, AllowedMode, Band, ErrorKind, IpMethod, NetworkMode, rssi_to_percentage,
};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{CommandEntry, Translation, arg};
use crate::signals::{Capability, Signal};
use crate::wrapper::Wrapper;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// `_OBLS` polls before the SIM is declared dead.
const SIM_RETRIES: u32 = 30;
const SIM_RETRY_DELAY: Duration = Duration::from_secs(4);

const ALLOWED_DICT: [(AllowedMode, Code); 5] = [
    (AllowedMode::Any, Code::Num(5)),
    (AllowedMode::TwoGPreferred, Code::Num(2)),
    (AllowedMode::ThreeGPreferred, Code::Num(3)),
    (AllowedMode::TwoGOnly, Code::Num(0)),
    (AllowedMode::ThreeGOnly, Code::Num(1)),
];

const CONN_DICT: [(NetworkMode, Code); 5] = [
    (NetworkMode::TwoGOnly, Code::Num(0)),
    (NetworkMode::ThreeGOnly, Code::Num(1)),
    (NetworkMode::TwoGPreferred, Code::Num(2)),
    (NetworkMode::ThreeGPreferred, Code::Num(3)),
    (NetworkMode::Any, Code::Num(5)),
];

// Option has no U2600 and calls U1800 "U1700"
const BAND_DICT: [(Band, Code); 13] = [
    (Band::ANY, Code::Name("ANY")),
    (Band::EGSM, Code::Name("EGSM")),
    (Band::DCS, Code::Name("DCS")),
    (Band::PCS, Code::Name("PCS")),
    (Band::G850, Code::Name("G850")),
    (Band::U2100, Code::Name("U2100")),
    (Band::U1800, Code::Name("U1700")),
    (Band::U17IV, Code::Name("U17IV")),
    (Band::U800, Code::Name("U800")),
    (Band::U850, Code::Name("U850")),
    (Band::U900, Code::Name("U900")),
    (Band::U17IX, Code::Name("U17IX")),
    (Band::U1900, Code::Name("U1900")),
];

/// `_OSSYSI: <system>` cell change notification.
fn option_conn_mode(args: &str) -> ModemResult<Option<Signal>> {
    let mode = match args.trim() {
        "0" => NetworkMode::Gprs,
        "2" => NetworkMode::Umts,
        _ => NetworkMode::Unknown,
    };
    Ok(Some(Signal::NetworkMode(mode)))
}

/// `_OSIGQ: <rssi>,<ber>`.
fn option_rssi(args: &str) -> ModemResult<Option<Signal>> {
    Ok(Some(Signal::SignalQuality(rssi_to_percentage(arg(args, 0)?))))
}

/// `_OWANCALL: <cid>,<state>`: 0 down, 1 up, 2 setting up, 3 setup failed.
fn option_call_state(args: &str) -> ModemResult<Option<Signal>> {
    match arg::<u32>(args, 1)? {
        0 | 3 => Ok(Some(Signal::Disconnected)),
        1 => Ok(Some(Signal::Connected)),
        _ => Ok(None),
    }
}

fn code_num(code: Code) -> ModemResult<u32> {
    code.num()
        .ok_or_else(|| ModemError::InvalidData(format!("bad _OPSYS code {:?}", code)))
}

/// Wait for `_OBLS` to report SIM, contacts and SMS all ready.
fn sim_ready(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        for attempt in 1..=SIM_RETRIES {
            let reply = wrapper.query("AT_OBLS", "get_sim_status").await?;
            let caps = reply.first()?;
            let status: (u32, u32, u32) = (caps.parse("sim")?, caps.parse("contacts")?, caps.parse("sms")?);
            if status == (1, 1, 1) {
                return Ok(());
            }
            debug!(attempt, ?status, "SIM not ready yet");
            sleep(SIM_RETRY_DELAY).await;
        }
        Err(ModemError::new(
            ErrorKind::General,
            format!("Max number of attempts reached {}", SIM_RETRIES),
        ))
    })
}

/// `_OPBM?` as band name to enabled flag.
async fn band_states(wrapper: &Wrapper) -> ModemResult<HashMap<String, bool>> {
    let reply = wrapper.query("AT_OPBM?", "get_band").await?;
    reply
        .matches
        .iter()
        .map(|caps| Ok((caps.str("name").trim().to_string(), caps.parse::<u32>("active")? == 1)))
        .collect()
}

fn get_band(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<Band>> {
    Box::pin(async move {
        let current = band_states(wrapper).await?;
        // ANY cannot be combined with anything else
        if current.get("ANY") == Some(&true) {
            return Ok(Band::ANY);
        }
        Ok(wrapper
            .custom()
            .band_dict()
            .iter()
            .filter(|(_, code)| matches!(code, Code::Name(name) if current.get(*name) == Some(&true)))
            .fold(Band::UNKNOWN, |acc, (band, _)| acc | *band))
    })
}

fn set_band(wrapper: &Wrapper, band: Band) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        if band == Band::ANY {
            return wrapper.send_at("AT_OPBM=\"ANY\",1").await;
        }
        let current = band_states(wrapper).await?;
        let supported: Vec<(Band, &str)> = wrapper
            .custom()
            .band_dict()
            .iter()
            .filter(|(b, _)| *b != Band::ANY)
            .filter_map(|(b, code)| match code {
                Code::Name(name) => Some((*b, *name)),
                _ => None,
            })
            .collect();
        if !supported.iter().any(|(b, _)| band.intersects(*b)) {
            return Err(ModemError::new(
                ErrorKind::OperationNotSupported,
                format!("unsupported band {:#x}", band.bits()),
            ));
        }

        // Switch the wanted bands on before the others go off. Bands the
        // device does not list are left alone.
        for (b, name) in &supported {
            if band.intersects(*b) && current.get(*name) == Some(&false) {
                wrapper.send_at(&format!("AT_OPBM=\"{}\",1", name)).await?;
            }
        }
        for (b, name) in &supported {
            if !band.intersects(*b) && current.get(*name) == Some(&true) {
                wrapper.send_at(&format!("AT_OPBM=\"{}\",0", name)).await?;
            }
        }
        Ok(())
    })
}

fn get_network_mode(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<NetworkMode>> {
    Box::pin(async move {
        let reply = wrapper.query("AT_OPSYS?", "get_network_mode").await?;
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
        wrapper.send_at(&format!("AT_OPSYS={},2", code)).await
    })
}

fn set_allowed_mode(wrapper: &Wrapper, mode: AllowedMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let code = code_num(wrapper.custom().allowed_code(mode)?)?;
        wrapper.send_at(&format!("AT_OPSYS={},2", code)).await
    })
}

fn hso_authenticate(
    wrapper: &Wrapper,
    user: String,
    password: String,
    auth: u32,
) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        let raw = format!(
            "AT$QCPDPP={},{},\"{}\",\"{}\"",
            conn_id,
            AllowedAuth(auth).single_method(),
            user,
            password
        );
        wrapper.send_at(&raw).await
    })
}

fn hso_connect(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        wrapper.send_at(&format!("AT_OWANCALL={},1,0", conn_id)).await
    })
}

fn hso_disconnect(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        wrapper.send_at(&format!("AT_OWANCALL={},0,0", conn_id)).await
    })
}

fn hso_ip4_config(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<Vec<String>>> {
    Box::pin(async move {
        let conn_id = wrapper.conn_id()?;
        let reply = wrapper
            .query(format!("AT_OWANDATA={}", conn_id), "get_ip4_config")
            .await?;
        let caps = reply
            .matches
            .first()
            .ok_or_else(|| ModemError::new(ErrorKind::General, "no _OWANDATA yet"))?;
        // Only two name servers are reported
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
    custom.family = "option";
    custom.async_regex = Some(Regex::new(r"\r\n(?P<signal>_O[A-Z]{3,}):\s(?P<args>.*)\r\n")?);
    custom.allowed_dict = ALLOWED_DICT.to_vec();
    custom.band_dict = BAND_DICT.to_vec();
    custom.conn_dict = CONN_DICT.to_vec();
    custom.capabilities = vec![
        Capability::NetworkMode,
        Capability::SmsNotifyOnline,
        Capability::SignalQuality,
    ];

    let catalog = &mut custom.catalog;
    catalog.insert("get_imei", CommandEntry::extract(r"\r\n(?P<imei>\d+),\S+\r\n")?);
    catalog.insert(
        "get_sim_status",
        CommandEntry::extract(r"_OBLS:\s(?P<sim>\d),(?P<contacts>\d),(?P<sms>\d)")?,
    );
    catalog.insert(
        "get_band",
        CommandEntry::extract(r"\r\n(?P<name>.*):\s+(?P<active>\d)")?,
    );
    catalog.insert(
        "get_network_mode",
        CommandEntry::extract(r"_OPSYS:\s(?P<mode>\d),(?P<domain>\d)")?,
    );

    custom.translate("_OSSYSI", Translation::Transform(option_conn_mode));
    custom.translate("_OSIGQ", Translation::Transform(option_rssi));

    custom.hooks.sim_ready = Some(sim_ready);
    custom.hooks.get_band = Some(get_band);
    custom.hooks.set_band = Some(set_band);
    custom.hooks.get_network_mode = Some(get_network_mode);
    custom.hooks.set_network_mode = Some(set_network_mode);
    custom.hooks.set_allowed_mode = Some(set_allowed_mode);

    // Search on any network, then turn on cell change and signal reports
    custom.sim_init = vec![
        "AT_OPSYS=5,2".to_string(),
        "AT_OSSYS=1".to_string(),
        "AT_OSQI=1".to_string(),
    ];
    Ok(custom)
}

pub(super) fn hso_customizer() -> ModemResult<Customizer> {
    let mut custom = customizer()?;
    custom.family = "option-hso";
    custom.ip_method = IpMethod::Static;
    custom.catalog.insert(
        "get_ip4_config",
        CommandEntry::extract(
            r"\r\n_OWANDATA:\s(?P<cid>\d),\s(?P<ip>.*),\s(?P<ign1>.*),\s(?P<dns1>.*),\s(?P<dns2>.*),\s(?P<ign2>.*),\s(?P<ign3>.*),\s(?P<baud>\d+)\r?\r\n",
        )?,
    );
    custom.translate("_OWANCALL", Translation::Transform(option_call_state));

    custom.hooks.authenticate = Some(hso_authenticate);
    custom.hooks.connect = Some(hso_connect);
    custom.hooks.disconnect = Some(hso_disconnect);
    custom.hooks.get_ip4_config = Some(hso_ip4_config);
    Ok(custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ModemState;
    use crate::wrapper::testing::{drain, wrapper_with};

    const BANDS: &str = "\r\nANY: 0\r\nEGSM: 1\r\nDCS: 1\r\nU2100: 1\r\nU1700: 0\r\n\r\nOK\r\n";

    #[test]
    fn test_notifications() {
        assert_eq!(
            option_conn_mode("2").unwrap(),
            Some(Signal::NetworkMode(NetworkMode::Umts))
        );
        assert_eq!(option_rssi("31,99").unwrap(), Some(Signal::SignalQuality(100)));
        assert_eq!(option_call_state("1,3").unwrap(), Some(Signal::Disconnected));
        assert_eq!(option_call_state("1,2").unwrap(), None);
    }

    #[tokio::test]
    async fn test_band_names() {
        let (wrapper, mut seen) = wrapper_with(customizer().unwrap(), vec![("AT_OPBM?", BANDS.into())]);
        assert_eq!(
            wrapper.get_band().await.unwrap(),
            Band::EGSM | Band::DCS | Band::U2100
        );
        drain(&mut seen);

        wrapper.set_band(Band::U1800 | Band::U2100).await.unwrap();
        let lines = drain(&mut seen);
        assert_eq!(lines[0], "AT_OPBM?");
        assert_eq!(lines[1], "AT_OPBM=\"U1700\",1");
        assert!(lines.contains(&"AT_OPBM=\"EGSM\",0".to_string()));
        assert!(lines.contains(&"AT_OPBM=\"DCS\",0".to_string()));
        assert!(!lines.contains(&"AT_OPBM=\"U2100\",1".to_string()));
    }

    #[tokio::test]
    async fn test_sim_ready_polls() {
        let (wrapper, mut seen) = wrapper_with(
            customizer().unwrap(),
            vec![("AT_OBLS", "\r\n_OBLS: 1,1,1\r\n\r\nOK\r\n".into())],
        );
        sim_ready(&wrapper).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT_OBLS"]);
    }

    #[tokio::test]
    async fn test_hso_call() {
        let (wrapper, mut seen) = wrapper_with(
            hso_customizer().unwrap(),
            vec![
                ("AT+CGDCONT?", "\r\nOK\r\n".into()),
                (
                    "AT_OWANDATA=1",
                    "\r\n_OWANDATA: 1, 10.1.1.2, 0.0.0.0, 10.0.0.53, 10.0.0.54, 0.0.0.0, 0.0.0.0, 144000\r\r\n\r\nOK\r\n".into(),
                ),
            ],
        );
        wrapper.set_status(ModemState::Registered);
        wrapper.set_apn("internet").await.unwrap();
        wrapper.connect_to_internet("").await.unwrap();
        let config = wrapper.get_ip4_config().await.unwrap();
        assert_eq!(config, vec!["10.1.1.2", "10.0.0.53", "10.0.0.54", "10.0.0.54"]);
        assert_eq!(wrapper.status(), ModemState::Connected);
        wrapper.disconnect_from_internet().await.unwrap();

        let lines = drain(&mut seen);
        assert!(lines.contains(&"AT_OWANCALL=1,1,0".to_string()));
        assert_eq!(lines.last().unwrap(), "AT_OWANCALL=1,0,0");
    }

    #[test]
    fn test_single_auth_method() {
        assert_eq!(AllowedAuth::NONE.single_method(), 0);
        assert_eq!(AllowedAuth::CHAP.single_method(), 2);
        assert_eq!(AllowedAuth(AllowedAuth::PAP.bits() | AllowedAuth::CHAP.bits()).single_method(), 1);
    }
}
