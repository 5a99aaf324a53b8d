// ABOUTME: D-Bus interface names the daemon exports per modem object
// ABOUTME: Used as keys for the per-interface property maps kept on each device

/// Exported interfaces, one property map each.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interface {
    Modem,
    Simple,
    Card,
    Contacts,
    Network,
    Sms,
    Ussd,
}

impl Interface {
    pub const ALL: [Interface; 7] = [
        Interface::Modem,
        Interface::Simple,
        Interface::Card,
        Interface::Contacts,
        Interface::Network,
        Interface::Sms,
        Interface::Ussd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Interface::Modem => "org.freedesktop.ModemManager.Modem",
            Interface::Simple => "org.freedesktop.ModemManager.Modem.Simple",
            Interface::Card => "org.freedesktop.ModemManager.Modem.Gsm.Card",
            Interface::Contacts => "org.freedesktop.ModemManager.Modem.Gsm.Contacts",
            Interface::Network => "org.freedesktop.ModemManager.Modem.Gsm.Network",
            Interface::Sms => "org.freedesktop.ModemManager.Modem.Gsm.SMS",
            Interface::Ussd => "org.freedesktop.ModemManager.Modem.Gsm.Ussd",
        }
    }
}
