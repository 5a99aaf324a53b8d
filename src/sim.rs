// ABOUTME: SIM card state kept while a device is enabled: charset, phonebook size, error reporting
// ABOUTME: Also maps +CPIN answers onto the lock codes clients see in UnlockRequired

use crate::datatypes::{Charset, ErrorKind};

/// Retries for reading the phonebook size right after enable.
pub const RETRY_ATTEMPTS: u32 = 3;
/// Seconds between those retries.
pub const RETRY_TIMEOUT: u64 = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimState {
    pub charset: Charset,
    /// Phonebook capacity, unknown until the SIM answers `+CPBR=?`
    pub size: Option<u32>,
    pub extended_errors: bool,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the preferred charset among those a modem supports.
    pub fn choose_charset(supported: &[Charset]) -> Option<Charset> {
        Charset::PREFERENCE
            .into_iter()
            .find(|charset| supported.contains(charset))
    }
}

/// Lock named by a `+CPIN:` answer, `None` for `READY`.
pub fn unlock_code(cpin: &str) -> Option<&'static str> {
    let code = match cpin.trim() {
        "READY" => return None,
        "SIM PIN" => "sim-pin",
        "SIM PUK" => "sim-puk",
        "SIM PIN2" => "sim-pin2",
        "SIM PUK2" => "sim-puk2",
        "PH-SIM PIN" => "ph-sim-pin",
        "PH-FSIM PIN" => "ph-fsim-pin",
        "PH-FSIM PUK" => "ph-fsim-puk",
        "PH-NET PIN" => "ph-net-pin",
        "PH-NET PUK" => "ph-net-puk",
        "PH-NETSUB PIN" => "ph-netsub-pin",
        "PH-NETSUB PUK" => "ph-netsub-puk",
        "PH-SP PIN" => "ph-sp-pin",
        "PH-SP PUK" => "ph-sp-puk",
        "PH-CORP PIN" => "ph-corp-pin",
        "PH-CORP PUK" => "ph-corp-puk",
        _ => "unknown",
    };
    Some(code)
}

/// Error raised when `+CPIN?` answers anything but `READY`.
pub fn cpin_error(cpin: &str) -> ErrorKind {
    match cpin.trim() {
        "SIM PIN" => ErrorKind::SimPinRequired,
        "SIM PUK" => ErrorKind::SimPukRequired,
        "SIM PIN2" => ErrorKind::SimPin2Required,
        "SIM PUK2" => ErrorKind::SimPuk2Required,
        "PH-SIM PIN" => ErrorKind::PhSimPinRequired,
        "PH-FSIM PIN" => ErrorKind::PhFSimPinRequired,
        "PH-FSIM PUK" => ErrorKind::PhFPukRequired,
        "PH-NET PIN" => ErrorKind::NetworkPinRequired,
        "PH-NET PUK" => ErrorKind::NetworkPukRequired,
        "PH-NETSUB PIN" => ErrorKind::NetworkSubsetPinRequired,
        "PH-NETSUB PUK" => ErrorKind::NetworkSubsetPukRequired,
        "PH-SP PIN" => ErrorKind::ServicePinRequired,
        "PH-SP PUK" => ErrorKind::ServicePukRequired,
        "PH-CORP PIN" => ErrorKind::CorporatePinRequired,
        "PH-CORP PUK" => ErrorKind::CorporatePukRequired,
        _ => ErrorKind::Unknown,
    }
}

/// Lock code for a failed authentication, as cached in UnlockRequired.
pub fn unlock_code_for(kind: ErrorKind) -> Option<&'static str> {
    let code = match kind {
        ErrorKind::SimPinRequired => "sim-pin",
        ErrorKind::SimPukRequired => "sim-puk",
        ErrorKind::SimPin2Required => "sim-pin2",
        ErrorKind::SimPuk2Required => "sim-puk2",
        ErrorKind::PhSimPinRequired => "ph-sim-pin",
        ErrorKind::PhFSimPinRequired => "ph-fsim-pin",
        ErrorKind::PhFPukRequired => "ph-fsim-puk",
        ErrorKind::NetworkPinRequired => "ph-net-pin",
        ErrorKind::NetworkPukRequired => "ph-net-puk",
        ErrorKind::NetworkSubsetPinRequired => "ph-netsub-pin",
        ErrorKind::NetworkSubsetPukRequired => "ph-netsub-puk",
        ErrorKind::ServicePinRequired => "ph-sp-pin",
        ErrorKind::ServicePukRequired => "ph-sp-puk",
        ErrorKind::CorporatePinRequired => "ph-corp-pin",
        ErrorKind::CorporatePukRequired => "ph-corp-puk",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_preference() {
        assert_eq!(
            SimState::choose_charset(&[Charset::Gsm, Charset::Ira, Charset::Ucs2]),
            Some(Charset::Ucs2)
        );
        assert_eq!(
            SimState::choose_charset(&[Charset::Gsm, Charset::Ira]),
            Some(Charset::Ira)
        );
        assert_eq!(SimState::choose_charset(&[]), None);
    }

    #[test]
    fn test_unlock_codes() {
        assert_eq!(unlock_code("READY"), None);
        assert_eq!(unlock_code("SIM PIN"), Some("sim-pin"));
        assert_eq!(unlock_code("PH-NET PIN"), Some("ph-net-pin"));
        assert_eq!(cpin_error("SIM PUK2"), ErrorKind::SimPuk2Required);
    }

    #[test]
    fn test_codes_agree_between_reply_and_error() {
        for reply in ["SIM PIN", "SIM PUK", "SIM PIN2", "SIM PUK2", "PH-FSIM PUK", "PH-CORP PIN"] {
            assert_eq!(unlock_code(reply), unlock_code_for(cpin_error(reply)), "{}", reply);
        }
    }
}
