// ABOUTME: Character sets a modem can be switched to with AT+CSCS
// ABOUTME: The selected set decides how names, numbers and USSD strings are encoded on the wire

use std::fmt;
use std::str::FromStr;

/// Terminal-equipment character set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    /// International reference alphabet (ITU-T T.50)
    #[default]
    Ira,
    /// GSM 03.38 default alphabet
    Gsm,
    /// 16-bit universal multiple-octet coded set, sent as hex
    Ucs2,
}

impl Charset {
    /// Preference order when choosing among the sets a modem supports.
    pub const PREFERENCE: [Charset; 3] = [Charset::Ucs2, Charset::Ira, Charset::Gsm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Charset::Ira => "IRA",
            Charset::Gsm => "GSM",
            Charset::Ucs2 => "UCS2",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IRA" => Ok(Charset::Ira),
            "GSM" => Ok(Charset::Gsm),
            "UCS2" => Ok(Charset::Ucs2),
            other => Err(format!("unsupported charset {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_parse() {
        assert_eq!("ucs2".parse::<Charset>(), Ok(Charset::Ucs2));
        assert_eq!("IRA".parse::<Charset>(), Ok(Charset::Ira));
        assert!("8859-1".parse::<Charset>().is_err());
    }
}
