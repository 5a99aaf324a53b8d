// ABOUTME: Classifies unsolicited modem output: family notifications, new-SMS, registration and ring lines
// ABOUTME: Each pass strips what it consumed so later passes and response matching never see it

use crate::error::{ModemError, ModemResult};
use crate::signals::Signal;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// What a family does with one raw notification name.
#[derive(Clone, Copy)]
pub enum Translation {
    /// Drop the notification
    Swallow,
    /// Emit a signal built from the raw argument text
    Verbatim(fn(String) -> Signal),
    /// Parse the arguments; `None` means nothing to emit
    Transform(fn(&str) -> ModemResult<Option<Signal>>),
}

impl std::fmt::Debug for Translation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Translation::Swallow => f.write_str("Swallow"),
            Translation::Verbatim(_) => f.write_str("Verbatim"),
            Translation::Transform(_) => f.write_str("Transform"),
        }
    }
}

/// Something the engine noticed without being asked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unsolicited {
    Signal(Signal),
    /// `+CMTI`: a message was stored at `index` in `store`
    NewSms { store: String, index: u32 },
    /// `+CDS`: a status report PDU, hex encoded
    DeliveryReport { pdu: String },
}

/// Run the family notification regex over `buf`.
///
/// Matches whose raw name has a translation are removed from `buf`; the
/// rest are left for the idle passes to report.
pub fn scan_async(
    buf: &mut String,
    regex: Option<&Regex>,
    translations: &HashMap<String, Translation>,
) -> Vec<Signal> {
    let Some(regex) = regex else {
        return Vec::new();
    };

    let mut signals = Vec::new();
    let mut spans = Vec::new();
    for caps in regex.captures_iter(buf) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.name("signal")) else {
            continue;
        };
        let args = caps.name("args").map(|m| m.as_str()).unwrap_or("").trim();

        let Some(translation) = translations.get(name.as_str()) else {
            debug!(name = name.as_str(), "no translation for notification");
            continue;
        };
        spans.push(whole.range());

        match translation {
            Translation::Swallow => {}
            Translation::Verbatim(build) => signals.push(build(args.to_string())),
            Translation::Transform(parse) => match parse(args) {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => {}
                Err(e) => warn!(name = name.as_str(), args, error = %e, "dropping notification"),
            },
        }
    }

    for span in spans.into_iter().rev() {
        buf.replace_range(span, "");
    }
    signals
}

/// Notifications recognised for every family while the engine is idle.
#[derive(Clone, Debug)]
pub struct IdlePatterns {
    cmti: Regex,
    stc: Regex,
    creg: Regex,
    ring: Regex,
    cds: Regex,
}

/// Longest partial line kept around waiting for its terminator.
const MAX_PARTIAL: usize = 1024;

impl IdlePatterns {
    pub fn new() -> ModemResult<IdlePatterns> {
        Ok(IdlePatterns {
            cmti: Regex::new(r#"\r\n\+CMTI:\s"(?P<where>\w{2,})",(?P<id>\d+)\r\n"#)?,
            stc: Regex::new(r"\r\n\+STC:\s\d+\r\n")?,
            creg: Regex::new(r"\r\n\+CREG:\s*(?P<status>\d)\r\n")?,
            ring: Regex::new(r"\r\nRING\r\n")?,
            cds: Regex::new(r"\r\n\+CDS:\s*\d+\r\n(?P<pdu>[0-9A-Fa-f]+)\r\n")?,
        })
    }

    /// Classify everything in `buf` once the family scan has run.
    ///
    /// A trailing line without its terminator stays in `buf`; complete
    /// lines nobody claimed are logged and dropped.
    pub fn process(&self, buf: &mut String) -> Vec<Unsolicited> {
        let found = self.take(buf);
        self.drop_leftovers(buf);
        found
    }

    /// Remove and return the complete notifications in `buf`, leaving any
    /// other text in place. Used on response buffers too, so a new-SMS
    /// line arriving mid-reply is not lost.
    pub fn take(&self, buf: &mut String) -> Vec<Unsolicited> {
        let mut found = Vec::new();

        strip(&self.cmti, buf, |caps| {
            match caps["id"].parse() {
                Ok(index) => found.push(Unsolicited::NewSms {
                    store: caps["where"].to_string(),
                    index,
                }),
                Err(_) => warn!(id = &caps["id"], "bad +CMTI index"),
            }
        });
        strip(&self.stc, buf, |_| {});
        strip(&self.creg, buf, |caps| {
            if let Ok(status) = caps["status"].parse() {
                found.push(Unsolicited::Signal(Signal::CregReceived(status)));
            }
        });
        strip(&self.ring, buf, |_| found.push(Unsolicited::Signal(Signal::CallReceived)));
        strip(&self.cds, buf, |caps| {
            found.push(Unsolicited::DeliveryReport {
                pdu: caps["pdu"].to_string(),
            })
        });
        found
    }

    fn drop_leftovers(&self, buf: &mut String) {
        let keep_from = if buf.ends_with("\r\n") {
            buf.len() - 2
        } else {
            buf.rfind("\r\n").unwrap_or(0)
        };

        let dropped = &buf[..keep_from];
        if !dropped.trim().is_empty() {
            warn!(data = ?dropped, "unmatched unsolicited data");
        }
        buf.replace_range(..keep_from, "");

        if buf.len() > MAX_PARTIAL {
            warn!(data = ?buf, "discarding overlong partial line");
            buf.clear();
        }
    }
}

fn strip(regex: &Regex, buf: &mut String, mut found: impl FnMut(&regex::Captures<'_>)) {
    let mut spans = Vec::new();
    for caps in regex.captures_iter(buf) {
        found(&caps);
        if let Some(whole) = caps.get(0) {
            spans.push(whole.range());
        }
    }
    for span in spans.into_iter().rev() {
        buf.replace_range(span, "");
    }
}

/// Parse a comma separated notification argument, failing with
/// `InvalidData` when the field is absent or malformed.
pub fn arg<T: std::str::FromStr>(args: &str, position: usize) -> ModemResult<T> {
    let field = args
        .split(',')
        .nth(position)
        .ok_or_else(|| ModemError::InvalidData(format!("missing field {} in {:?}", position, args)))?;
    field
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| ModemError::InvalidData(format!("bad field {} in {:?}", position, args)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::rssi_to_percentage;

    fn rssi(args: &str) -> ModemResult<Option<Signal>> {
        Ok(Some(Signal::SignalQuality(rssi_to_percentage(arg(args, 0)?))))
    }

    fn translations() -> HashMap<String, Translation> {
        let mut map = HashMap::new();
        map.insert("^RSSI".to_string(), Translation::Transform(rssi));
        map.insert("^BOOT".to_string(), Translation::Swallow);
        map
    }

    #[test]
    fn test_scan_removes_known_notifications() {
        let regex = Regex::new(r"\r\n(?P<signal>\^[A-Z]{3,9}):(?P<args>.*)\r\n").unwrap();
        let mut buf = "\r\n^RSSI:31\r\n\r\n^BOOT:1,2\r\n\r\n^XYZ:1\r\n\r\nOK\r\n".to_string();

        let signals = scan_async(&mut buf, Some(&regex), &translations());
        assert_eq!(signals, vec![Signal::SignalQuality(100)]);
        assert_eq!(buf, "\r\n^XYZ:1\r\n\r\nOK\r\n");
    }

    #[test]
    fn test_scan_drops_failed_transform() {
        let regex = Regex::new(r"\r\n(?P<signal>\^[A-Z]{3,9}):(?P<args>.*)\r\n").unwrap();
        let mut buf = "\r\n^RSSI:zz\r\n".to_string();
        assert!(scan_async(&mut buf, Some(&regex), &translations()).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_idle_notifications() {
        let patterns = IdlePatterns::new().unwrap();
        let mut buf =
            "\r\n+CMTI: \"ME\",3\r\n\r\n+STC: 0\r\n\r\n+CREG: 1\r\n\r\nRING\r\n".to_string();
        let found = patterns.process(&mut buf);
        assert_eq!(
            found,
            vec![
                Unsolicited::NewSms { store: "ME".to_string(), index: 3 },
                Unsolicited::Signal(Signal::CregReceived(1)),
                Unsolicited::Signal(Signal::CallReceived),
            ]
        );
        assert_eq!(buf, "");
    }

    #[test]
    fn test_delivery_report_line() {
        let patterns = IdlePatterns::new().unwrap();
        let mut buf = "\r\n+CDS: 25\r\n0006110B911\r\n".to_string();
        let found = patterns.process(&mut buf);
        assert_eq!(
            found,
            vec![Unsolicited::DeliveryReport { pdu: "0006110B911".to_string() }]
        );
    }

    #[test]
    fn test_partial_line_is_kept() {
        let patterns = IdlePatterns::new().unwrap();
        let mut buf = "\r\nGARBAGE\r\n\r\n+CMTI: \"SM\",".to_string();
        assert!(patterns.process(&mut buf).is_empty());
        assert_eq!(buf, "\r\n+CMTI: \"SM\",");

        buf.push_str("7\r\n");
        let found = patterns.process(&mut buf);
        assert_eq!(found, vec![Unsolicited::NewSms { store: "SM".to_string(), index: 7 }]);
    }

    #[test]
    fn test_take_leaves_reply_text() {
        let patterns = IdlePatterns::new().unwrap();
        let mut buf = "\r\n+CSQ: 17,99\r\n\r\n+CMTI: \"SM\",2\r\n\r\nOK\r\n".to_string();
        let found = patterns.take(&mut buf);
        assert_eq!(found, vec![Unsolicited::NewSms { store: "SM".to_string(), index: 2 }]);
        assert_eq!(buf, "\r\n+CSQ: 17,99\r\n\r\nOK\r\n");
    }

    #[test]
    fn test_arg_parsing() {
        assert_eq!(arg::<u32>("4,\"23415\",3G", 0).unwrap(), 4);
        assert_eq!(arg::<String>("4,\"23415\",3G", 1).unwrap(), "23415");
        assert!(arg::<u32>("4", 2).is_err());
    }
}
