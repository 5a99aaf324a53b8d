// ABOUTME: AT command record submitted to the engine and the reply it resolves to
// ABOUTME: Replies expose the named capture groups of the command's extract regex

use crate::datatypes::ErrorKind;
use crate::error::{ModemError, ModemResult};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Timeout applied to commands that do not ask for another one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A single AT command.
///
/// `name` selects the catalog entry whose regexes decide when the reply is
/// complete and what to extract from it.
#[derive(Clone, PartialEq, Eq)]
pub struct AtCommand {
    pub raw: String,
    pub name: String,
    pub eol: String,
    /// Payload written once the modem shows the `> ` prompt
    pub splitcmd: Option<String>,
    pub timeout: Duration,
}

impl AtCommand {
    pub fn new(raw: impl Into<String>, name: impl Into<String>) -> AtCommand {
        AtCommand {
            raw: raw.into(),
            name: name.into(),
            eol: "\r\n".to_string(),
            splitcmd: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_eol(mut self, eol: impl Into<String>) -> Self {
        self.eol = eol.into();
        self
    }

    pub fn with_splitcmd(mut self, splitcmd: impl Into<String>) -> Self {
        self.splitcmd = Some(splitcmd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Raw command plus terminator, as written to the port.
    pub fn wire(&self) -> String {
        format!("{}{}", self.raw, self.eol)
    }
}

impl fmt::Debug for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<AtCommand name: {} raw: {:?} timeout: {}s>",
            self.name,
            self.wire(),
            self.timeout.as_secs()
        )
    }
}

/// Named groups of one extract match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captures {
    groups: HashMap<String, String>,
}

impl Captures {
    pub fn from_regex(regex: &Regex, caps: &regex::Captures<'_>) -> Captures {
        let groups = regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Captures { groups }
    }

    /// Value of group `name`, `None` if it did not participate.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    /// Value of group `name`, empty if it did not participate.
    pub fn str(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Parse group `name`, failing with `InvalidData` when absent or malformed.
    pub fn parse<T: FromStr>(&self, name: &str) -> ModemResult<T> {
        let value = self
            .get(name)
            .ok_or_else(|| ModemError::InvalidData(format!("missing group {}", name)))?;
        value
            .trim()
            .parse()
            .map_err(|_| ModemError::InvalidData(format!("bad {}: {:?}", name, value)))
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Captures {
        Captures {
            groups: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// What a completed command resolves to.
///
/// `text` is the buffered response up to and including the end marker.
/// `matches` holds every extract match; it is empty for commands whose
/// catalog entry defines no extract regex.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub matches: Vec<Captures>,
}

impl Reply {
    /// First extract match, or an error naming the command when the reply
    /// carried none.
    pub fn first(&self) -> ModemResult<&Captures> {
        self.matches.first().ok_or_else(|| {
            ModemError::new(ErrorKind::Unknown, format!("unexpected reply {:?}", self.text))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}
