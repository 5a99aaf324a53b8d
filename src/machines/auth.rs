// ABOUTME: SIM authentication gate run before a device is enabled
// ABOUTME: Locked SIMs publish their lock in UnlockRequired; a slow or absent SIM is retried then given up on

use crate::datatypes::{ErrorKind, Interface};
use crate::error::{ModemError, ModemResult};
use crate::sim;
use crate::wrapper::Wrapper;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Pause between attempts while the SIM is busy or failing.
const SIM_FAIL_DELAY: Duration = Duration::from_secs(15);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AuthState {
    /// Ask `+CPIN?`, after `failures` busy or failed answers
    CheckPin { failures: u32 },
    Ready,
}

fn is_sim_settling(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::SimBusy | ErrorKind::SimFailure | ErrorKind::SimNotStarted
    )
}

/// Make sure the SIM is unlocked.
///
/// A SIM waiting for a PIN or PUK fails with the matching kind and its
/// lock code is stored in the `UnlockRequired` property, so a client can
/// send the code and enable again. A SIM that keeps answering busy or
/// failing is reported as not inserted.
pub async fn authenticate(wrapper: &Wrapper) -> ModemResult<()> {
    let retries = wrapper.custom().auth_retries();
    let mut state = AuthState::CheckPin { failures: 0 };
    loop {
        debug!(?state, "authentication");
        state = match state {
            AuthState::CheckPin { failures } => match wrapper.check_pin().await {
                Ok(_) => AuthState::Ready,
                Err(e) => {
                    if let Some(code) = e.kind().and_then(sim::unlock_code_for) {
                        info!(lock = code, "SIM is locked");
                        wrapper
                            .board()
                            .set_property(Interface::Modem, "UnlockRequired", code);
                        return Err(e);
                    }
                    if !e.kind().is_some_and(is_sim_settling) {
                        return Err(e);
                    }
                    let failures = failures + 1;
                    if failures >= retries {
                        warn!(failures, error = %e, "SIM never answered");
                        return Err(ModemError::new(
                            ErrorKind::SimNotInserted,
                            format!("SIM not ready after {} attempts: {}", failures, e),
                        ));
                    }
                    debug!(failures, error = %e, "SIM not ready yet");
                    sleep(SIM_FAIL_DELAY).await;
                    AuthState::CheckPin { failures }
                }
            },
            AuthState::Ready => {
                wrapper
                    .board()
                    .set_property(Interface::Modem, "UnlockRequired", "");
                return Ok(());
            }
        };
    }
}
