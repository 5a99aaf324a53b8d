// ABOUTME: Network registration machine: waits for automatic registration or registers by hand
// ABOUTME: Manual registration prefers the home network from the IMSI, then a scanned or roaming operator

use crate::datatypes::{ErrorKind, RegStatus};
use crate::error::{ModemError, ModemResult};
use crate::signals::Signal;
use crate::wrapper::{OperatorFormat, Wrapper};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How long to wait for a `+CREG` change before asking again.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(15);
/// Waits before falling back to manual registration.
const MAX_WAIT_TIMES: u32 = 6;

/// MCC+MNC prefix of an IMSI.
const HOME_PREFIX_LEN: usize = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NetregState {
    CheckRegistration,
    /// Registered; make sure it is with the requested operator
    CheckConstraints,
    ManualRegistration,
}

/// Get the device registered, with the operator `netid` when non-empty.
pub async fn register(wrapper: &Wrapper, netid: &str) -> ModemResult<()> {
    let mut creg = wrapper.board().subscribe();
    let mut state = NetregState::CheckRegistration;
    let mut waits = 0;
    let mut searching = false;
    let mut tried_manual = false;

    loop {
        debug!(?state, netid, "registration");
        state = match state {
            NetregState::CheckRegistration => {
                let (mode, status) = wrapper.get_netreg_status().await?;
                match status {
                    RegStatus::Home | RegStatus::Roaming => NetregState::CheckConstraints,
                    RegStatus::Denied => {
                        return Err(ModemError::new(
                            ErrorKind::NetworkNotAllowed,
                            format!("registration denied: +CREG: {},{}", mode, status as u32),
                        ));
                    }
                    RegStatus::Idle | RegStatus::Searching | RegStatus::Unknown => {
                        if mode == 0 {
                            wrapper.set_netreg_notification(1).await?;
                        }
                        // idle means the radio is not even looking
                        if status == RegStatus::Idle && !searching {
                            wrapper.register_automatically().await?;
                            searching = true;
                        }
                        waits += 1;
                        if waits <= MAX_WAIT_TIMES {
                            let _ = timeout(REGISTER_TIMEOUT, next_creg(&mut creg)).await;
                            NetregState::CheckRegistration
                        } else if !tried_manual {
                            NetregState::ManualRegistration
                        } else {
                            return Err(ModemError::new(
                                ErrorKind::NoNetwork,
                                "manual registration did not complete",
                            ));
                        }
                    }
                }
            }
            NetregState::CheckConstraints => {
                if netid.is_empty() {
                    info!("registered");
                    return Ok(());
                }
                let (current, _) = wrapper.get_network_info(OperatorFormat::Numeric).await?;
                if current == netid {
                    info!(netid, "registered with requested operator");
                    return Ok(());
                }
                if tried_manual {
                    return Err(ModemError::new(
                        ErrorKind::NoNetwork,
                        format!("registered with {} instead of {}", current, netid),
                    ));
                }
                debug!(current, netid, "registered with the wrong operator");
                NetregState::ManualRegistration
            }
            NetregState::ManualRegistration => {
                tried_manual = true;
                let imsi = wrapper.get_imsi().await?;
                let prefix = imsi.get(..HOME_PREFIX_LEN).unwrap_or(&imsi);
                let target = if prefix == netid {
                    netid.to_string()
                } else {
                    find_netid(wrapper, netid, prefix).await?
                };
                info!(netid = target.as_str(), "registering manually");
                wrapper.register_with_netid(&target).await?;
                waits = 0;
                NetregState::CheckRegistration
            }
        };
    }
}

/// First scanned operator that is either the requested one or the home
/// network, else the first preferred roaming operator in range.
async fn find_netid(wrapper: &Wrapper, netid: &str, home: &str) -> ModemResult<String> {
    let networks = wrapper.get_network_names().await?;
    if let Some(found) = networks
        .iter()
        .find(|op| (!netid.is_empty() && op.netid == netid) || op.netid == home)
    {
        return Ok(found.netid.clone());
    }

    let roaming = match wrapper.get_roaming_ids().await {
        Ok(ids) => ids,
        Err(e) if e.is(ErrorKind::OperationNotAllowed) || e.is(ErrorKind::OperationNotSupported) => {
            warn!(error = %e, "no preferred operator list");
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    roaming
        .into_iter()
        .find(|id| networks.iter().any(|op| &op.netid == id))
        .ok_or_else(|| {
            ModemError::new(
                ErrorKind::NoNetwork,
                format!("no operator in range to register with ({} scanned)", networks.len()),
            )
        })
}

async fn next_creg(rx: &mut broadcast::Receiver<Signal>) {
    loop {
        match rx.recv().await {
            Ok(Signal::CregReceived(_)) | Err(RecvError::Lagged(_)) => return,
            Ok(_) => {}
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
