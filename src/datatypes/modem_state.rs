// ABOUTME: Modem lifecycle states as observed by D-Bus clients, plus USSD session state
// ABOUTME: State values are ordered so range checks such as "at least registered" read naturally

use num_enum::TryFromPrimitive;
use std::fmt;

/// Device state. Transitions are monotonic within one connect/disconnect
/// cycle; disabling always resets to [`ModemState::Disabled`].
#[derive(TryFromPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ModemState {
    Unknown = 0,
    #[default]
    Disabled = 10,
    Disabling = 20,
    Enabling = 30,
    Enabled = 40,
    Searching = 50,
    Registered = 60,
    Disconnecting = 70,
    Connecting = 80,
    Connected = 90,
}

impl ModemState {
    pub fn is_enabled(&self) -> bool {
        *self >= ModemState::Enabled
    }
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModemState::Unknown => "unknown",
            ModemState::Disabled => "disabled",
            ModemState::Disabling => "disabling",
            ModemState::Enabling => "enabling",
            ModemState::Enabled => "enabled",
            ModemState::Searching => "searching",
            ModemState::Registered => "registered",
            ModemState::Disconnecting => "disconnecting",
            ModemState::Connecting => "connecting",
            ModemState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// USSD session state exported as the `State` property.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum UssdState {
    #[default]
    Idle,
    Active,
    UserResponse,
}

impl UssdState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UssdState::Idle => "idle",
            UssdState::Active => "active",
            UssdState::UserResponse => "user-response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        assert!(ModemState::Connected > ModemState::Connecting);
        assert!(ModemState::Registered >= ModemState::Enabled);
        assert!(!ModemState::Enabling.is_enabled());
        assert!(ModemState::Searching.is_enabled());
    }

    #[test]
    fn test_state_round_trip_from_u32() {
        assert_eq!(ModemState::try_from(60u32).ok(), Some(ModemState::Registered));
        assert!(ModemState::try_from(15u32).is_err());
    }

    #[test]
    fn test_ussd_state_names() {
        assert_eq!(UssdState::UserResponse.as_str(), "user-response");
        assert_eq!(UssdState::default().as_str(), "idle");
    }
}
