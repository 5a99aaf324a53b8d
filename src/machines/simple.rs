// ABOUTME: One-shot connect used by the simple interface: unlock, register, program APN, band and mode, dial
// ABOUTME: NDIS families authenticate the PDP context before activating it instead of dialing

use crate::datatypes::{AllowedAuth, Band, ErrorKind, NetworkMode, RegStatus};
use crate::error::{ModemError, ModemResult};
use crate::machines::netreg;
use crate::wrapper::Wrapper;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Registration polls after band and mode changes.
const REGISTRATION_TRIES: u32 = 30;
const REGISTRATION_INTERVAL: Duration = Duration::from_secs(3);

/// Radios need a moment after a band change.
const BAND_SETTLE: Duration = Duration::from_secs(1);
/// Long enough for the radio to drop its registration after a mode change.
const MODE_SETTLE: Duration = Duration::from_secs(5);

/// What a client asked `Simple.Connect` for. Absent entries are left as
/// they are on the device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimpleSettings {
    pub pin: Option<String>,
    pub apn: Option<String>,
    pub band: Option<Band>,
    pub network_mode: Option<NetworkMode>,
    pub network_id: Option<String>,
    /// Number to dial, `*99***<context>#` when absent
    pub number: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SimpleState {
    Begin,
    CheckPin,
    Register,
    SetApn,
    SetBand,
    SetNetworkMode,
    WaitForRegistration { tries: u32 },
    Connect,
    Done,
}

/// Drive the device from wherever it is to a started data call.
pub async fn connect_simple(wrapper: &Wrapper, settings: SimpleSettings) -> ModemResult<()> {
    let mut state = SimpleState::Begin;
    loop {
        debug!(?state, "simple connect");
        state = match state {
            SimpleState::Begin => SimpleState::CheckPin,
            SimpleState::CheckPin => match wrapper.check_pin().await {
                Ok(_) => SimpleState::Register,
                Err(e) if e.is(ErrorKind::SimPinRequired) => {
                    let Some(pin) = &settings.pin else {
                        return Err(ModemError::new(ErrorKind::SimPinRequired, "no PIN provided"));
                    };
                    wrapper.send_pin(pin).await?;
                    sleep(wrapper.custom().auth_delay()).await;
                    SimpleState::Register
                }
                Err(e) => return Err(e),
            },
            SimpleState::Register => {
                if let Some(netid) = &settings.network_id {
                    netreg::register(wrapper, netid).await?;
                }
                SimpleState::SetApn
            }
            SimpleState::SetApn => {
                if let Some(apn) = &settings.apn {
                    wrapper.set_apn(apn).await?;
                }
                SimpleState::SetBand
            }
            SimpleState::SetBand => {
                if let Some(band) = settings.band {
                    wrapper.set_band(band).await?;
                    sleep(BAND_SETTLE).await;
                }
                SimpleState::SetNetworkMode
            }
            SimpleState::SetNetworkMode => {
                // Connection managers send ANY when they mean "whatever
                // the profile selected"
                match settings.network_mode {
                    Some(mode) if mode != NetworkMode::Any => {
                        if wrapper.get_network_mode().await? != mode {
                            wrapper.set_network_mode(mode).await?;
                            sleep(MODE_SETTLE).await;
                        }
                    }
                    _ => {}
                }
                SimpleState::WaitForRegistration {
                    tries: REGISTRATION_TRIES,
                }
            }
            SimpleState::WaitForRegistration { tries } => {
                let (_, status) = wrapper.get_netreg_status().await?;
                if status.is_registered() {
                    SimpleState::Connect
                } else if tries == 0 || status == RegStatus::Denied {
                    return Err(ModemError::new(
                        ErrorKind::NoNetwork,
                        format!("not registered ({:?})", status),
                    ));
                } else {
                    sleep(REGISTRATION_INTERVAL).await;
                    SimpleState::WaitForRegistration { tries: tries - 1 }
                }
            }
            SimpleState::Connect => {
                if let Some(authenticate) = wrapper.custom().hooks().authenticate {
                    let user = settings.username.clone().unwrap_or_default();
                    let password = settings.password.clone().unwrap_or_default();
                    authenticate(wrapper, user, password, AllowedAuth::PAP.bits()).await?;
                }
                let number = match &settings.number {
                    Some(number) => number.clone(),
                    None => format!("*99***{}#", wrapper.conn_id()?),
                };
                wrapper.connect_to_internet(&number).await?;
                SimpleState::Done
            }
            SimpleState::Done => {
                info!("simple connect done");
                return Ok(());
            }
        };
    }
}
