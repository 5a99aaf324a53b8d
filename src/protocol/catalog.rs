// ABOUTME: Catalog of named AT commands with the regexes that end, extract and fail their replies
// ABOUTME: Device families take a copy of the standard catalog and override individual entries

use crate::error::ModemResult;
use regex::Regex;
use std::collections::HashMap;

/// End marker shared by every command that just answers `OK`.
pub const OK_REGEX: &str = r"\r\n(?P<resp>OK)\r\n";

/// Failure lines recognised for every command.
pub const ERROR_REGEX: &str = r"\r\n(?P<error>\+CMS ERROR:\s\d{3}|\+CME ERROR:\s[^\r\n]+|INPUT VALUE IS OUT OF RANGE|ERROR)\r\n";

/// `end` and `extract` regexes of one command.
#[derive(Clone, Debug)]
pub struct CommandEntry {
    pub end: Regex,
    pub extract: Option<Regex>,
}

impl CommandEntry {
    /// Entry for a command whose only reply is `OK`.
    pub fn ok() -> ModemResult<CommandEntry> {
        Ok(CommandEntry {
            end: Regex::new(OK_REGEX)?,
            extract: Some(Regex::new(OK_REGEX)?),
        })
    }

    /// Entry extracting `pattern`, terminated by `OK`.
    pub fn extract(pattern: &str) -> ModemResult<CommandEntry> {
        Ok(CommandEntry {
            end: Regex::new(OK_REGEX)?,
            extract: Some(Regex::new(pattern)?),
        })
    }

    /// Entry extracting `pattern`, terminated by `end`.
    pub fn extract_until(pattern: &str, end: &str) -> ModemResult<CommandEntry> {
        Ok(CommandEntry {
            end: Regex::new(end)?,
            extract: Some(Regex::new(pattern)?),
        })
    }

    /// Entry terminated by `end` that hands back the raw buffer.
    pub fn raw_until(end: &str) -> ModemResult<CommandEntry> {
        Ok(CommandEntry {
            end: Regex::new(end)?,
            extract: None,
        })
    }
}

/// Logical command name to [`CommandEntry`].
#[derive(Clone, Debug)]
pub struct Catalog {
    entries: HashMap<String, CommandEntry>,
    fallback: CommandEntry,
    error: Regex,
}

const OK_COMMANDS: &[&str] = &[
    "add_contact",
    "cancel_ussd",
    "change_pin",
    "delete_contact",
    "delete_sms",
    "disable_echo",
    "enable_echo",
    "enable_pin",
    "enable_radio",
    "register_with_netid",
    "reset_settings",
    "send_at",
    "send_pin",
    "send_puk",
    "set_apn",
    "set_charset",
    "set_netreg_notification",
    "set_network_info_format",
    "set_sms_format",
    "set_sms_indication",
    "set_smsc",
    "set_storage",
];

const EXTRACT_COMMANDS: &[(&str, &str)] = &[
    (
        "check_pin",
        r"\r\n\+CPIN:\s(?P<resp>READY|SIM PIN2?|SIM PUK2?|PH-SIM PIN|PH-FSIM PIN|PH-FSIM PUK|PH-NET PIN|PH-NET PUK|PH-NETSUB PIN|PH-NETSUB PUK|PH-SP PIN|PH-SP PUK|PH-CORP PIN|PH-CORP PUK)\r\n",
    ),
    (
        "find_contacts",
        r#"\r\n\+CPBF:\s(?P<id>\d+),"(?P<number>[+0-9a-fA-F*#]*)",(?P<category>\d+),"(?P<name>.*)""#,
    ),
    (
        "get_apns",
        r#"\r\n\+CGDCONT:\s(?P<index>\d+),"[A-Za-z0-9]*","(?P<apn>[^"]*)","(?P<ip>[^"]*)",\d,\d"#,
    ),
    ("get_charsets", r#""(?P<lang>[^"]*)",?"#),
    (
        "get_contact",
        r#"\r\n\+CPBR:\s(?P<id>\d+),"(?P<number>[+0-9a-fA-F*#]*)",(?P<cat>\d+),"(?P<name>.*)"\r\n"#,
    ),
    (
        "get_card_version",
        r"\r\n(\+C?GMR:)?(?P<version>.*)\r\n\r\nOK\r\n",
    ),
    ("get_card_model", r"\r\n(?P<model>.*)\r\n\r\nOK\r\n"),
    ("get_charset", r#"\r\n\+CSCS:\s"(?P<lang>.*)"\r\n"#),
    ("get_manufacturer_name", r"\r\n(?P<name>.*)\r\n\r\nOK\r\n"),
    ("get_imei", r"\r\n(?P<imei>\d+)\r\n"),
    ("get_imsi", r"\r\n(?P<imsi>\d+)\r\n"),
    (
        "get_netreg_status",
        r"\r\n\+CREG:\s(?P<mode>\d),(?P<status>\d+)(,[0-9a-fA-F]*,[0-9a-fA-F]*)?\r\n",
    ),
    (
        "get_network_info",
        r#"\r\n\+COPS:\s+(\d,\d,"(?P<netname>[^"]*)"(,(?P<status>\d))?|(?P<error>\d))\s*\r\n"#,
    ),
    ("get_signal_quality", r"\r\n\+CSQ:\s(?P<rssi>\d+),(?P<ber>\d+)\r\n"),
    ("get_sms_format", r"\r\n\+CMGF:\s(?P<format>\d)\r\n"),
    ("get_phonebook_size", r"\r\n\+CPBR:\s\(\d+-(?P<size>\d+)\).*\r\n"),
    ("get_pin_status", r"\r\n\+CLCK:\s(?P<status>\d)\r\n"),
    ("get_radio_status", r"\r\n\+CFUN:\s?(?P<status>\d)\r\n"),
    (
        "get_roaming_ids",
        r#"\r\n\+CPOL:\s(?P<index>\d+),(?P<type>\d),"(?P<netid>\d+)""#,
    ),
    (
        "list_sms",
        r#"\r\n\+CMGL:\s(?P<id>\d+),(?P<where>\d),(?P<alpha>"[^"]*")?,\d+\r\n(?P<pdu>\w+)"#,
    ),
    (
        "get_sms",
        r#"\r\n\+CMGR:\s(?P<where>\d),(?P<alpha>"[^"]*")?,\d+\r\n(?P<pdu>\w+)\r\n"#,
    ),
    ("get_smsc", r#"\r\n\+CSCA:\s"(?P<smsc>.*)",\d+\r\n"#),
    ("save_sms", r"\r\n\+CMGW:\s(?P<index>\d+)\r\n"),
    ("send_sms", r"\r\n\+CMGS:\s(?P<index>\d+)\r\n"),
    ("send_sms_from_storage", r"\r\n\+CMSS:\s(?P<index>\d+)\r\n"),
];

impl Catalog {
    /// The catalog every family starts from.
    pub fn standard() -> ModemResult<Catalog> {
        let mut entries = HashMap::new();
        for name in OK_COMMANDS {
            entries.insert(name.to_string(), CommandEntry::ok()?);
        }
        for (name, pattern) in EXTRACT_COMMANDS {
            entries.insert(name.to_string(), CommandEntry::extract(pattern)?);
        }

        entries.insert(
            "list_contacts".to_string(),
            CommandEntry::extract_until(
                r#"\r\n\+CPBR:\s(?P<id>\d+),"(?P<number>[+0-9a-fA-F*#]*)",(?P<cat>\d+),"(?P<name>.*)""#,
                r"(\r\n)?\r\n(OK)\r\n",
            )?,
        );
        entries.insert(
            "get_network_names".to_string(),
            CommandEntry::extract_until(
                r#"\((?P<id>\d+),"(?P<lname>[^"]*)","(?P<sname>[^"]*)","(?P<netid>\d+)",(?P<type>\d)\),?"#,
                r"\r\n\r\nOK\r\n",
            )?,
        );
        // The +CUSD reply arrives after the OK, so it marks the end itself.
        entries.insert(
            "send_ussd".to_string(),
            CommandEntry::extract_until(
                r#"\r\n\+CUSD:\s(?P<index>\d)(,"(?P<resp>[^"]*)"(,(?P<dcs>\d+))?)?\r\n"#,
                r"\r\n\+CUSD:\s\d[^\r\n]*\r\n",
            )?,
        );

        Ok(Catalog {
            entries,
            fallback: CommandEntry::ok()?,
            error: Regex::new(ERROR_REGEX)?,
        })
    }

    /// Entry for `name`; unknown names behave like plain `OK` commands.
    pub fn get(&self, name: &str) -> &CommandEntry {
        self.entries.get(name).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add or replace the entry for `name`.
    pub fn insert(&mut self, name: &str, entry: CommandEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    pub fn error_regex(&self) -> &Regex {
        &self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ErrorKind;

    fn extract<'a>(catalog: &Catalog, name: &str, text: &'a str) -> Vec<regex::Captures<'a>> {
        let entry = catalog.get(name);
        let extract = entry.extract.as_ref().unwrap();
        extract.captures_iter(text).collect()
    }

    #[test]
    fn test_check_pin_reply() {
        let catalog = Catalog::standard().unwrap();
        let caps = extract(&catalog, "check_pin", "\r\n+CPIN: SIM PIN\r\n\r\nOK\r\n");
        assert_eq!(&caps[0]["resp"], "SIM PIN");
        let caps = extract(&catalog, "check_pin", "\r\n+CPIN: PH-NET PIN\r\n\r\nOK\r\n");
        assert_eq!(&caps[0]["resp"], "PH-NET PIN");
    }

    #[test]
    fn test_network_names() {
        let catalog = Catalog::standard().unwrap();
        let text = "\r\n+COPS: (2,\"Home\",\"Hme\",\"23430\",2),(1,\"Other\",\"Oth\",\"23415\",0),,(0-4),(0-2)\r\n\r\nOK\r\n";
        assert!(catalog.get("get_network_names").end.is_match(text));
        let caps = extract(&catalog, "get_network_names", text);
        assert_eq!(caps.len(), 2);
        assert_eq!(&caps[0]["lname"], "Home");
        assert_eq!(&caps[1]["netid"], "23415");
        assert_eq!(&caps[1]["type"], "0");
    }

    #[test]
    fn test_network_info_variants() {
        let catalog = Catalog::standard().unwrap();
        let caps = extract(&catalog, "get_network_info", "\r\n+COPS: 0,2,\"21401\",2\r\n\r\nOK\r\n");
        assert_eq!(&caps[0]["netname"], "21401");
        assert_eq!(&caps[0]["status"], "2");

        let caps = extract(&catalog, "get_network_info", "\r\n+COPS: 0\r\n\r\nOK\r\n");
        assert_eq!(&caps[0]["error"], "0");
    }

    #[test]
    fn test_list_sms_with_and_without_alpha() {
        let catalog = Catalog::standard().unwrap();
        let text = "\r\n+CMGL: 1,1,,23\r\n0791AB\r\n+CMGL: 2,1,\"616E64\",23\r\n0791CD\r\n\r\nOK\r\n";
        let caps = extract(&catalog, "list_sms", text);
        assert_eq!(caps.len(), 2);
        assert_eq!(&caps[0]["pdu"], "0791AB");
        assert_eq!(&caps[1]["id"], "2");
    }

    #[test]
    fn test_ussd_reply_after_ok() {
        let catalog = Catalog::standard().unwrap();
        let text = "\r\nOK\r\n\r\n+CUSD: 0,\"0042\",15\r\n";
        assert!(catalog.get("send_ussd").end.is_match(text));
        let caps = extract(&catalog, "send_ussd", text);
        assert_eq!(&caps[0]["index"], "0");
        assert_eq!(&caps[0]["resp"], "0042");
    }

    #[test]
    fn test_error_regex_fragments() {
        let catalog = Catalog::standard().unwrap();
        let cases = [
            ("\r\n+CME ERROR: 11\r\n", ErrorKind::SimPinRequired),
            ("\r\n+CME ERROR: SIM busy\r\n", ErrorKind::SimBusy),
            ("\r\nERROR\r\n", ErrorKind::GenericError),
            ("\r\nINPUT VALUE IS OUT OF RANGE\r\n", ErrorKind::InputValueError),
        ];
        for (text, kind) in cases {
            let caps = catalog.error_regex().captures(text).unwrap();
            assert_eq!(ErrorKind::from_fragment(&caps["error"]), kind, "{:?}", text);
        }
    }

    #[test]
    fn test_every_cme_code_maps_to_its_kind() {
        use crate::datatypes::CmeCode;
        let catalog = Catalog::standard().unwrap();
        for code in (0u32..=65535).filter_map(|c| CmeCode::try_from(c).ok()) {
            let line = format!("\r\n+CME ERROR: {}\r\n", code as u32);
            let caps = catalog.error_regex().captures(&line).unwrap();
            assert_eq!(ErrorKind::from_fragment(&caps["error"]), ErrorKind::from(code));
        }
    }

    #[test]
    fn test_unknown_name_falls_back_to_ok() {
        let catalog = Catalog::standard().unwrap();
        assert!(!catalog.contains("frobnicate"));
        assert!(catalog.get("frobnicate").end.is_match("\r\nOK\r\n"));
    }

    #[test]
    fn test_override_entry() {
        let mut catalog = Catalog::standard().unwrap();
        catalog.insert(
            "get_signal_quality",
            CommandEntry::extract(r"\s*\+CIND:\s+[0-9]*,(?P<sig>[0-9]*),.*").unwrap(),
        );
        let caps = extract(&catalog, "get_signal_quality", "\r\n+CIND: 5,4,0,0,1\r\n\r\nOK\r\n");
        assert_eq!(&caps[0]["sig"], "4");
    }
}
