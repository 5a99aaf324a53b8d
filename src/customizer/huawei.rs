// ABOUTME: Huawei family: ^-prefixed notifications, ^SYSCFG band and mode selection, operator name cleanup
// ABOUTME: SMSC changes go through IRA because these firmwares reject a UCS2 encoded number

use super::{BoxFuture, Code, Customizer};
use crate::datatypes::{Band, Charset, NetworkMode, rssi_to_percentage};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{CommandEntry, Translation, arg};
use crate::signals::{Capability, Signal};
use crate::wrapper::Wrapper;
use regex::Regex;

/// `^SYSCFG` band value meaning "any band". It cannot be combined.
const ANY_BAND: u32 = 0x3FFF_FFFF;

const CONN_DICT: [(NetworkMode, Code); 10] = [
    (NetworkMode::Gprs, Code::Pair(13, 1)),
    (NetworkMode::Edge, Code::Pair(13, 1)),
    (NetworkMode::TwoGOnly, Code::Pair(13, 1)),
    (NetworkMode::Umts, Code::Pair(14, 2)),
    (NetworkMode::Hsdpa, Code::Pair(14, 2)),
    (NetworkMode::Hsupa, Code::Pair(14, 2)),
    (NetworkMode::Hspa, Code::Pair(14, 2)),
    (NetworkMode::ThreeGOnly, Code::Pair(14, 2)),
    (NetworkMode::TwoGPreferred, Code::Pair(2, 1)),
    (NetworkMode::ThreeGPreferred, Code::Pair(2, 2)),
];

const BAND_DICT: [(Band, Code); 8] = [
    (Band::ANY, Code::Num(ANY_BAND)),
    (Band::DCS, Code::Num(0x0000_0080)),
    (Band::EGSM, Code::Num(0x0000_0100)),
    (Band::PCS, Code::Num(0x0020_0000)),
    (Band::G850, Code::Num(0x0008_0000)),
    (Band::U2100, Code::Num(0x0040_0000)),
    (Band::U1900, Code::Num(0x0080_0000)),
    (Band::U850, Code::Num(0x0400_0000)),
];

/// Translate `^MODE: <sys_mode>,<sys_submode>` into a network mode.
pub fn huawei_conn_mode(args: &str) -> ModemResult<Option<Signal>> {
    let mode = match args.replace(' ', "").as_str() {
        "0,0" | "0,2" | "5,0" => NetworkMode::Unknown,
        "3,0" | "3,1" | "3,2" | "3,3" => NetworkMode::Gprs,
        "5,4" => NetworkMode::Umts,
        "5,5" => NetworkMode::Hsdpa,
        "5,6" => NetworkMode::Hsupa,
        // 5,9 is HSPA+
        "5,7" | "5,9" => NetworkMode::Hspa,
        other => return Err(ModemError::InvalidData(format!("unknown ^MODE {:?}", other))),
    };
    Ok(Some(Signal::NetworkMode(mode)))
}

/// Translate `^DSFLOWRPT`: seven hex fields, of which the second and
/// third are the octets per second sent and received.
pub fn huawei_speed_report(args: &str) -> ModemResult<Option<Signal>> {
    let fields = args
        .split(',')
        .map(|f| u64::from_str_radix(f.trim(), 16))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ModemError::InvalidData(format!("bad ^DSFLOWRPT {:?}: {}", args, e)))?;
    if fields.len() != 7 {
        return Err(ModemError::InvalidData(format!("bad ^DSFLOWRPT {:?}", args)));
    }
    Ok(Some(Signal::DialStats {
        tx_bps: fields[1] * 8,
        rx_bps: fields[2] * 8,
    }))
}

fn huawei_rssi(args: &str) -> ModemResult<Option<Signal>> {
    Ok(Some(Signal::SignalQuality(rssi_to_percentage(arg(args, 0)?))))
}

/// Remove the control characters some firmwares pad operator names with.
/// Names made of `F`s come from an unprogrammed SIM field.
fn clean_operator_name(name: &str) -> String {
    if name.starts_with("FF") {
        return "Unknown Network".to_string();
    }
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-') || c.is_whitespace())
        .collect()
}

/// Current `^SYSCFG?` settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct SysCfg {
    mode_a: u32,
    mode_b: u32,
    band: u32,
    roam: u32,
    srv: u32,
}

impl SysCfg {
    fn network_mode(&self) -> NetworkMode {
        match (self.mode_a, self.mode_b) {
            (2, 1) => NetworkMode::TwoGPreferred,
            (2, 2) => NetworkMode::ThreeGPreferred,
            (13, 1) => NetworkMode::TwoGOnly,
            (14, 2) => NetworkMode::ThreeGOnly,
            _ => NetworkMode::Any,
        }
    }

    fn bands(&self) -> Band {
        if self.band == ANY_BAND {
            return Band::ANY;
        }
        BAND_DICT
            .iter()
            .filter(|(band, code)| *band != Band::ANY && matches!(code, Code::Num(v) if v & self.band != 0))
            .fold(Band::UNKNOWN, |acc, (band, _)| acc | *band)
    }

    fn command(&self) -> String {
        format!(
            "AT^SYSCFG={},{},{:X},{},{}",
            self.mode_a, self.mode_b, self.band, self.roam, self.srv
        )
    }
}

/// Vendor band mask for `band`. Zero when nothing in it is supported.
fn band_mask(band: Band) -> u32 {
    if band == Band::ANY {
        return ANY_BAND;
    }
    BAND_DICT
        .iter()
        .filter(|(b, _)| *b != Band::ANY && band.contains(*b))
        .filter_map(|(_, code)| code.num())
        .fold(0, |acc, v| acc | v)
}

async fn get_syscfg(wrapper: &Wrapper) -> ModemResult<SysCfg> {
    let reply = wrapper.query("AT^SYSCFG?", "get_syscfg").await?;
    let caps = reply.first()?;
    let band = u32::from_str_radix(caps.str("theband"), 16)
        .map_err(|_| ModemError::InvalidData(format!("bad ^SYSCFG band {:?}", caps.str("theband"))))?;
    Ok(SysCfg {
        mode_a: caps.parse("modea")?,
        mode_b: caps.parse("modeb")?,
        band,
        roam: caps.parse("roam")?,
        srv: caps.parse("srv")?,
    })
}

fn get_band(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<Band>> {
    Box::pin(async move { Ok(get_syscfg(wrapper).await?.bands()) })
}

fn set_band(wrapper: &Wrapper, band: Band) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let mut cfg = get_syscfg(wrapper).await?;
        // Unsatisfiable requests leave the band untouched
        let mask = band_mask(band);
        if mask != 0 {
            cfg.band = mask;
        }
        wrapper.send_at(&cfg.command()).await
    })
}

fn get_network_mode(wrapper: &Wrapper) -> BoxFuture<'_, ModemResult<NetworkMode>> {
    Box::pin(async move { Ok(get_syscfg(wrapper).await?.network_mode()) })
}

fn set_network_mode(wrapper: &Wrapper, mode: NetworkMode) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let mut cfg = get_syscfg(wrapper).await?;
        if let Ok(Code::Pair(a, b)) = wrapper.custom().conn_code(mode) {
            cfg.mode_a = a;
            cfg.mode_b = b;
        }
        wrapper.send_at(&cfg.command()).await
    })
}

fn set_smsc(wrapper: &Wrapper, smsc: String) -> BoxFuture<'_, ModemResult<()>> {
    Box::pin(async move {
        let guard = wrapper.charset_guard(Charset::Ira).await?;
        let result = wrapper.set_smsc_encoded(&smsc, guard.charset()).await;
        guard.restore().await?;
        result
    })
}

pub(super) fn customizer() -> ModemResult<Customizer> {
    let mut custom = Customizer::generic()?;
    custom.family = "huawei";
    custom.async_regex = Some(Regex::new(r"\r\n(?P<signal>\^[A-Z]{3,9}):(?P<args>.*)\r\n")?);
    custom.band_dict = BAND_DICT.to_vec();
    custom.conn_dict = CONN_DICT.to_vec();
    custom.capabilities = vec![Capability::NetworkMode, Capability::SignalQuality, Capability::Speed];

    custom.catalog.insert(
        "get_syscfg",
        CommandEntry::extract(
            r"\r\n\^SYSCFG:(?P<modea>\d+),(?P<modeb>\d+),(?P<theband>[0-9A-F]*),(?P<roam>\d),(?P<srv>\d)\r\n",
        )?,
    );
    custom.catalog.insert(
        "get_radio_status",
        CommandEntry::extract_until(r"\r\n\+CFUN:\s?(?P<status>\d)\r\n", r"\r\n\+CFUN:\s?\d\r\n")?,
    );

    custom.translate("^MODE", Translation::Transform(huawei_conn_mode));
    custom.translate("^RSSI", Translation::Transform(huawei_rssi));
    custom.translate("^DSFLOWRPT", Translation::Transform(huawei_speed_report));
    for ignored in ["^BOOT", "^SRVST", "^SIMST", "^CEND"] {
        custom.translate(ignored, Translation::Swallow);
    }

    custom.hooks.get_band = Some(get_band);
    custom.hooks.set_band = Some(set_band);
    custom.hooks.get_network_mode = Some(get_network_mode);
    custom.hooks.set_network_mode = Some(set_network_mode);
    custom.hooks.set_smsc = Some(set_smsc);
    custom.hooks.clean_operator_name = Some(clean_operator_name);

    custom.sim_init = vec![
        "AT^CURC=1".to_string(),
        "AT+COPS=3,0".to_string(),
        "AT+CPMS=\"SM\",\"SM\",\"SM\"".to_string(),
    ];
    Ok(custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::testing::{drain, wrapper_with};

    const SYSCFG: &str = "\r\n^SYSCFG:2,2,3FFFFFFF,1,2\r\n\r\nOK\r\n";

    #[test]
    fn test_mode_notifications() {
        assert_eq!(
            huawei_conn_mode("5,5").unwrap(),
            Some(Signal::NetworkMode(NetworkMode::Hsdpa))
        );
        assert_eq!(
            huawei_conn_mode("3,2").unwrap(),
            Some(Signal::NetworkMode(NetworkMode::Gprs))
        );
        assert!(huawei_conn_mode("9,9").is_err());
    }

    #[test]
    fn test_speed_report() {
        let signal = huawei_speed_report("00000010,00000100,00000200,0,0,0,0").unwrap();
        assert_eq!(signal, Some(Signal::DialStats { tx_bps: 0x800, rx_bps: 0x1000 }));
        assert!(huawei_speed_report("1,2").is_err());
    }

    #[test]
    fn test_operator_cleanup() {
        assert_eq!(clean_operator_name("vodafone ES@\u{1a}"), "vodafone ES");
        assert_eq!(clean_operator_name("FFFFFF"), "Unknown Network");
    }

    #[test]
    fn test_syscfg_decoding() {
        let cfg = SysCfg { mode_a: 14, mode_b: 2, band: 0x0040_0180, roam: 1, srv: 2 };
        assert_eq!(cfg.network_mode(), NetworkMode::ThreeGOnly);
        assert_eq!(cfg.bands(), Band::U2100 | Band::DCS | Band::EGSM);
        assert_eq!(cfg.command(), "AT^SYSCFG=14,2,400180,1,2");
        assert_eq!(band_mask(Band::ANY), ANY_BAND);
        assert_eq!(band_mask(Band::U17IX), 0);
    }

    #[tokio::test]
    async fn test_set_network_mode_keeps_band() {
        let (wrapper, mut seen) = wrapper_with(
            customizer().unwrap(),
            vec![("AT^SYSCFG?", SYSCFG.into())],
        );
        wrapper.set_network_mode(NetworkMode::TwoGOnly).await.unwrap();
        assert_eq!(
            drain(&mut seen),
            vec!["AT^SYSCFG?", "AT^SYSCFG=13,1,3FFFFFFF,1,2"]
        );
        assert_eq!(wrapper.get_band().await.unwrap(), Band::ANY);
        assert_eq!(wrapper.get_network_mode().await.unwrap(), NetworkMode::ThreeGPreferred);
    }

    #[tokio::test]
    async fn test_set_band() {
        let (wrapper, mut seen) = wrapper_with(
            customizer().unwrap(),
            vec![("AT^SYSCFG?", SYSCFG.into())],
        );
        wrapper.set_band(Band::U2100).await.unwrap();
        assert_eq!(drain(&mut seen)[1], "AT^SYSCFG=2,2,400000,1,2");
    }
}
