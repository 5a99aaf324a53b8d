// ABOUTME: Network operations: registration status and info, scans, signal quality, bands, modes, APNs
// ABOUTME: Registration info is cached briefly and only announced to clients when it changes

use super::{Wrapper, lock, radio_command};
use crate::datatypes::{
    AccessTech, AllowedMode, Band, ErrorKind, Interface, ModemState, NetworkMode, NetworkOperator,
    RegStatus, RegistrationInfo, rssi_to_percentage,
};
use crate::encoding::{decode_text, from_ucs2};
use crate::error::{ModemError, ModemResult};
use crate::protocol::AtCommand;
use crate::signals::Signal;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How long a registration snapshot is served from cache.
const REGISTRATION_CACHE: Duration = Duration::from_secs(5);

/// A full operator scan can take a long time.
const SCAN_TIMEOUT: Duration = Duration::from_secs(40);

/// Operator names some modems report instead of failing.
const LIMITED_SERVICE: &str = "Limited Service";

/// Operator format selected with `AT+COPS=3,<format>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperatorFormat {
    /// Long alphanumeric name
    Name = 0,
    /// MCC+MNC
    Numeric = 2,
}

#[derive(Debug, Default)]
pub(super) struct RegistrationCache {
    fresh: Mutex<Option<(Instant, RegistrationInfo)>>,
    last_emitted: Mutex<Option<RegistrationInfo>>,
}

impl RegistrationCache {
    fn get(&self) -> Option<RegistrationInfo> {
        lock(&self.fresh)
            .as_ref()
            .filter(|(expires, _)| *expires > Instant::now())
            .map(|(_, info)| info.clone())
    }

    /// Store `info`. Returns whether it differs from what was last
    /// announced.
    fn store(&self, info: &RegistrationInfo) -> bool {
        *lock(&self.fresh) = Some((Instant::now() + REGISTRATION_CACHE, info.clone()));
        let mut last = lock(&self.last_emitted);
        if last.as_ref() == Some(info) {
            return false;
        }
        *last = Some(info.clone());
        true
    }

    pub(super) fn clear(&self) {
        *lock(&self.fresh) = None;
        *lock(&self.last_emitted) = None;
    }
}

/// Technologies a plain `+COPS?` reports that a vendor notification may
/// already have refined. The richer value is kept.
fn is_refinement(reported: AccessTech, current: AccessTech) -> bool {
    match reported {
        AccessTech::Gprs => current == AccessTech::Edge,
        AccessTech::Umts => matches!(
            current,
            AccessTech::Hsdpa | AccessTech::Hsupa | AccessTech::Hspa
        ),
        _ => false,
    }
}

impl Wrapper {
    /// `(+CREG mode, registration status)`.
    pub async fn get_netreg_status(&self) -> ModemResult<(u32, RegStatus)> {
        let reply = self.query("AT+CREG?", "get_netreg_status").await?;
        let caps = reply.first()?;
        let status: u32 = caps.parse("status")?;
        let status = RegStatus::try_from(status).unwrap_or(RegStatus::Unknown);
        Ok((caps.parse("mode")?, status))
    }

    pub async fn set_netreg_notification(&self, mode: u32) -> ModemResult<()> {
        self.query(format!("AT+CREG={}", mode), "set_netreg_notification")
            .await
            .map(|_| ())
    }

    /// Current operator in `format` and the access technology in use.
    /// Fails with `NoNetwork` when the modem is not attached.
    pub async fn get_network_info(&self, format: OperatorFormat) -> ModemResult<(String, AccessTech)> {
        self.query(format!("AT+COPS=3,{}", format as u32), "set_network_info_format")
            .await?;
        let lease = self.lease_charset().await;
        let reply = self.query("AT+COPS?", "get_network_info").await?;
        let caps = reply.first()?;
        if caps.get("error").is_some() {
            return Err(ModemError::new(ErrorKind::NoNetwork, reply.text.trim()));
        }

        let netname = decode_text(caps.str("netname"), lease.charset());
        if netname == LIMITED_SERVICE {
            return Err(ModemError::new(ErrorKind::NoNetwork, netname));
        }
        let netname = match self.custom.hooks().clean_operator_name {
            Some(clean) if format == OperatorFormat::Name => clean(&netname),
            _ => netname,
        };
        Ok((netname, AccessTech::from_cops(caps.str("status"))))
    }

    /// Registration snapshot, served from a short-lived cache.
    pub async fn get_netreg_info(&self) -> ModemResult<RegistrationInfo> {
        if let Some(info) = self.registration.get() {
            debug!("registration info served from cache");
            return Ok(info);
        }
        let (_, status) = self.get_netreg_status().await?;
        let info = self.registration_info(status).await?;
        self.update_registration(info.clone());
        Ok(info)
    }

    /// A `+CREG` notification arrived.
    pub(super) async fn on_creg(&self, status: u32) -> ModemResult<()> {
        let status = RegStatus::try_from(status).unwrap_or(RegStatus::Unknown);
        let info = self.registration_info(status).await?;
        self.update_registration(info);
        Ok(())
    }

    async fn registration_info(&self, status: RegStatus) -> ModemResult<RegistrationInfo> {
        let mut info = RegistrationInfo {
            status,
            ..Default::default()
        };
        for format in [OperatorFormat::Numeric, OperatorFormat::Name] {
            let name = match self.get_network_info(format).await {
                Ok((name, tech)) => {
                    self.update_access_tech(tech);
                    name
                }
                Err(e) if e.is(ErrorKind::NoNetwork) => String::new(),
                Err(e) => return Err(e),
            };
            match format {
                OperatorFormat::Numeric => info.operator_code = name,
                OperatorFormat::Name => info.operator_name = name,
            }
        }
        Ok(info)
    }

    fn update_access_tech(&self, reported: AccessTech) {
        let current = self
            .board
            .property(Interface::Network, "AccessTechnology")
            .and_then(|v| v.as_u32())
            .and_then(|v| AccessTech::try_from(v).ok())
            .unwrap_or(AccessTech::Unknown);
        if !is_refinement(reported, current) {
            self.board
                .set_property(Interface::Network, "AccessTechnology", reported as u32);
        }
    }

    /// Cache `info`, move between searching and registered, and announce
    /// it when it changed.
    pub fn update_registration(&self, info: RegistrationInfo) {
        let changed = self.registration.store(&info);

        if matches!(
            self.status(),
            ModemState::Enabled | ModemState::Searching | ModemState::Registered
        ) {
            let state = if info.status.is_registered() {
                ModemState::Registered
            } else {
                ModemState::Searching
            };
            self.set_status(state);
        }
        if changed {
            debug!(?info, "registration changed");
            self.emit(Signal::RegistrationInfo(info));
        }
    }

    /// Scan for operators.
    pub async fn get_network_names(&self) -> ModemResult<Vec<NetworkOperator>> {
        let cmd = AtCommand::new("AT+COPS=?", "get_network_names").with_timeout(SCAN_TIMEOUT);
        let lease = self.lease_charset().await;
        let reply = self.send(cmd).await?;
        let charset = lease.charset();
        reply
            .matches
            .iter()
            .map(|caps| {
                Ok(NetworkOperator {
                    status: caps.parse("id")?,
                    long_name: decode_text(caps.str("lname"), charset),
                    short_name: decode_text(caps.str("sname"), charset),
                    netid: from_ucs2(caps.str("netid")),
                    access_tech: AccessTech::from_scan(caps.str("type")),
                })
            })
            .collect()
    }

    /// Manually select the operator `netid`.
    pub async fn register_with_netid(&self, netid: &str) -> ModemResult<()> {
        let raw = format!("AT+COPS=1,2,\"{}\"", netid);
        self.send(radio_command(raw, "register_with_netid")).await?;
        Ok(())
    }

    /// Let the modem pick an operator on its own.
    pub async fn register_automatically(&self) -> ModemResult<()> {
        self.send_at("AT+COPS=0,,").await
    }

    /// Network ids of the preferred operator list.
    pub async fn get_roaming_ids(&self) -> ModemResult<Vec<String>> {
        let reply = self.query("AT+CPOL?", "get_roaming_ids").await?;
        Ok(reply
            .matches
            .iter()
            .map(|caps| from_ucs2(caps.str("netid")))
            .collect())
    }

    /// Signal quality as a percentage.
    pub async fn get_signal_quality(&self) -> ModemResult<u32> {
        if let Some(hook) = self.custom.hooks().get_signal_quality {
            return hook(self).await;
        }
        let reply = self.query("AT+CSQ", "get_signal_quality").await?;
        Ok(rssi_to_percentage(reply.first()?.parse("rssi")?))
    }

    pub async fn get_band(&self) -> ModemResult<Band> {
        if let Some(hook) = self.custom.hooks().get_band {
            return hook(self).await;
        }
        self.only_any_band()?;
        Ok(Band::ANY)
    }

    pub async fn set_band(&self, band: Band) -> ModemResult<()> {
        if let Some(hook) = self.custom.hooks().set_band {
            return hook(self, band).await;
        }
        self.only_any_band()?;
        if band == Band::ANY {
            return Ok(());
        }
        Err(ModemError::new(
            ErrorKind::OperationNotSupported,
            format!("band {:#x} cannot be selected", band.bits()),
        ))
    }

    /// Without a band hook only families that list no bands (or only
    /// `ANY`) can answer band requests.
    fn only_any_band(&self) -> ModemResult<()> {
        let any_only = self
            .custom
            .band_dict()
            .iter()
            .all(|(band, _)| *band == Band::ANY);
        if any_only {
            return Ok(());
        }
        Err(ModemError::new(
            ErrorKind::OperationNotSupported,
            "band selection not available",
        ))
    }

    pub async fn get_network_mode(&self) -> ModemResult<NetworkMode> {
        if let Some(hook) = self.custom.hooks().get_network_mode {
            return hook(self).await;
        }
        Ok(NetworkMode::Any)
    }

    pub async fn set_network_mode(&self, mode: NetworkMode) -> ModemResult<()> {
        if let Some(hook) = self.custom.hooks().set_network_mode {
            return hook(self, mode).await;
        }
        if mode == NetworkMode::Any {
            return Ok(());
        }
        Err(ModemError::new(
            ErrorKind::OperationNotSupported,
            format!("network mode {} cannot be selected", mode),
        ))
    }

    /// Allowed mode last set by a client.
    pub fn get_allowed_mode(&self) -> AllowedMode {
        self.board
            .property(Interface::Network, "AllowedMode")
            .and_then(|v| v.as_u32())
            .and_then(|v| AllowedMode::try_from(v).ok())
            .unwrap_or_default()
    }

    pub async fn set_allowed_mode(&self, mode: AllowedMode) -> ModemResult<()> {
        match self.custom.hooks().set_allowed_mode {
            Some(hook) => hook(self, mode).await?,
            None if mode == AllowedMode::Any => {}
            None => {
                return Err(ModemError::new(
                    ErrorKind::OperationNotSupported,
                    format!("allowed mode {:?} cannot be selected", mode),
                ));
            }
        }
        self.board
            .set_property(Interface::Network, "AllowedMode", mode as u32);
        Ok(())
    }

    /// PDP contexts defined on the SIM as `(context id, APN)`.
    pub async fn get_apns(&self) -> ModemResult<Vec<(u32, String)>> {
        let reply = self.query("AT+CGDCONT?", "get_apns").await?;
        reply
            .matches
            .iter()
            .map(|caps| Ok((caps.parse("index")?, caps.str("apn").to_string())))
            .collect()
    }

    /// Select `apn` for the next data call, reusing a context that already
    /// carries it or defining a new one after the highest id.
    pub async fn set_apn(&self, apn: &str) -> ModemResult<()> {
        let apns = self.get_apns().await?;
        if let Some((index, _)) = apns.iter().find(|(_, existing)| existing == apn) {
            debug!(index, apn, "reusing PDP context");
            self.session().conn_id = Some(*index);
            return Ok(());
        }

        let conn_id = apns.iter().map(|(index, _)| *index).max().map_or(1, |max| max + 1);
        self.query(format!("AT+CGDCONT={},\"IP\",\"{}\"", conn_id, apn), "set_apn")
            .await?;
        debug!(conn_id, "PDP context defined");
        self.session().conn_id = Some(conn_id);
        Ok(())
    }
}
