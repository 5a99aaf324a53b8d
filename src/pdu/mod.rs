// ABOUTME: 3GPP TS 23.040 building blocks shared by the SMS encoder and decoder
// ABOUTME: Address fields, service-centre timestamps, data coding schemes and user-data headers

mod deliver;
mod submit;
mod wap;

pub use deliver::{DecodedPdu, PduKind, decode_pdu};
pub use submit::{SubmitPdu, encode_submit};
pub use wap::{
    MmsNotification, MmsPart, decode_mms_headers, decode_multipart, encode_notifyresp_ind,
    encode_send_req, extract_push_notification, is_wap_push,
};

#[cfg(test)]
pub(crate) use deliver::encode_deliver as encode_deliver_fixture;
#[cfg(test)]
pub(crate) use wap::fixtures::notification_push;

use crate::encoding::{decode_gsm7, encode_gsm7, pack_septets, unpack_septets};
use crate::error::{ModemError, ModemResult};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

/// Type-of-address octet for international numbers.
const TOA_INTERNATIONAL: u8 = 0x91;
/// Type-of-address octet for unknown/national numbers.
const TOA_UNKNOWN: u8 = 0x81;
/// Type-of-number bits for alphanumeric originators.
const TON_ALPHANUMERIC: u8 = 0x50;

/// Alphabet a message body is coded in. The numeric value is the
/// "format" the message layer keys on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Alphabet {
    #[default]
    Gsm7 = 0x00,
    EightBit = 0x04,
    Ucs2 = 0x08,
}

impl Alphabet {
    /// Alphabet selected by a TP-DCS octet.
    pub fn from_dcs(dcs: u8) -> Alphabet {
        match dcs & 0xF0 {
            0x00..=0x30 => match dcs & 0x0C {
                0x04 => Alphabet::EightBit,
                0x08 => Alphabet::Ucs2,
                _ => Alphabet::Gsm7,
            },
            0xE0 => Alphabet::Ucs2,
            0xF0 if dcs & 0x04 != 0 => Alphabet::EightBit,
            _ => Alphabet::Gsm7,
        }
    }

    pub fn dcs(&self) -> u8 {
        *self as u8
    }
}

/// Concatenation info carried in a user-data header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Concat {
    pub reference: u16,
    pub count: u8,
    pub seq: u8,
}

/// Parsed user-data header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserDataHeader {
    pub concat: Option<Concat>,
    /// Application port addressing: (destination, origin)
    pub ports: Option<(u16, u16)>,
}

impl UserDataHeader {
    /// Parse the information elements of a header (without its length
    /// octet).
    pub fn parse(data: &[u8]) -> UserDataHeader {
        let mut udh = UserDataHeader::default();
        let mut pos = 0;
        while pos + 2 <= data.len() {
            let iei = data[pos];
            let len = data[pos + 1] as usize;
            let Some(body) = data.get(pos + 2..pos + 2 + len) else {
                break;
            };
            match (iei, body) {
                (0x00, [reference, count, seq]) => {
                    udh.concat = Some(Concat {
                        reference: *reference as u16,
                        count: *count,
                        seq: *seq,
                    })
                }
                (0x08, [hi, lo, count, seq]) => {
                    udh.concat = Some(Concat {
                        reference: u16::from_be_bytes([*hi, *lo]),
                        count: *count,
                        seq: *seq,
                    })
                }
                (0x04, [dest, orig]) => udh.ports = Some((*dest as u16, *orig as u16)),
                (0x05, [d1, d2, o1, o2]) => {
                    udh.ports = Some((u16::from_be_bytes([*d1, *d2]), u16::from_be_bytes([*o1, *o2])))
                }
                _ => {}
            }
            pos += 2 + len;
        }
        udh
    }

    /// 8-bit reference concatenation header, length octet included.
    pub fn concat8(reference: u8, count: u8, seq: u8) -> Vec<u8> {
        vec![0x05, 0x00, 0x03, reference, count, seq]
    }
}

/// Swap the nibbles of BCD digits: "1234" → `[0x21, 0x43]`, odd lengths
/// padded with `F`.
pub fn encode_semi_octets(digits: &str) -> Vec<u8> {
    let nibbles: Vec<u8> = digits
        .chars()
        .map(|c| match c {
            '0'..='9' => c as u8 - b'0',
            '*' => 0x0A,
            '#' => 0x0B,
            'a' | 'A' => 0x0C,
            'b' | 'B' => 0x0D,
            'c' | 'C' => 0x0E,
            _ => 0x0F,
        })
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| pair[0] | (pair.get(1).copied().unwrap_or(0x0F) << 4))
        .collect()
}

/// Inverse of [`encode_semi_octets`], `digits` limiting the output length.
pub fn decode_semi_octets(data: &[u8], digits: usize) -> String {
    let mut out = String::with_capacity(digits);
    for byte in data {
        for nibble in [byte & 0x0F, byte >> 4] {
            if out.len() >= digits {
                return out;
            }
            match nibble {
                0..=9 => out.push((b'0' + nibble) as char),
                0x0A => out.push('*'),
                0x0B => out.push('#'),
                0x0C => out.push('a'),
                0x0D => out.push('b'),
                0x0E => out.push('c'),
                _ => return out,
            }
        }
    }
    out
}

/// TP address field (originator/destination/recipient).
pub fn encode_address(number: &str) -> Vec<u8> {
    let (toa, digits) = match number.strip_prefix('+') {
        Some(rest) => (TOA_INTERNATIONAL, rest),
        None => (TOA_UNKNOWN, number),
    };
    let mut out = vec![digits.len() as u8, toa];
    out.extend(encode_semi_octets(digits));
    out
}

/// SMSC address field; an empty number asks the modem to use the SIM's.
pub fn encode_smsc(number: Option<&str>) -> Vec<u8> {
    match number {
        None | Some("") => vec![0x00],
        Some(number) => {
            let (toa, digits) = match number.strip_prefix('+') {
                Some(rest) => (TOA_INTERNATIONAL, rest),
                None => (TOA_UNKNOWN, number),
            };
            let body = encode_semi_octets(digits);
            let mut out = vec![(body.len() + 1) as u8, toa];
            out.extend(body);
            out
        }
    }
}

/// Cursor over a PDU being decoded.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub(crate) fn u8(&mut self) -> ModemResult<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn take(&mut self, len: usize) -> ModemResult<&'a [u8]> {
        let out = self.data.get(self.pos..self.pos + len).ok_or_else(truncated)?;
        self.pos += len;
        Ok(out)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        out
    }

    /// TP address whose length octet counts digits.
    pub(crate) fn address(&mut self) -> ModemResult<String> {
        let digits = self.u8()? as usize;
        let toa = self.u8()?;
        let body = self.take(digits.div_ceil(2))?;
        if toa & 0x70 == TON_ALPHANUMERIC {
            let septets = digits * 4 / 7;
            return Ok(decode_gsm7(&unpack_septets(body, septets, 0)));
        }
        let number = decode_semi_octets(body, digits);
        Ok(if toa & 0x70 == 0x10 { format!("+{}", number) } else { number })
    }

    /// SMSC address whose length octet counts octets.
    pub(crate) fn smsc(&mut self) -> ModemResult<Option<String>> {
        let len = self.u8()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let toa = self.u8()?;
        let body = self.take(len - 1)?;
        let number = decode_semi_octets(body, body.len() * 2);
        Ok(Some(if toa & 0x70 == 0x10 { format!("+{}", number) } else { number }))
    }

    pub(crate) fn timestamp(&mut self) -> ModemResult<DateTime<FixedOffset>> {
        decode_timestamp(self.take(7)?)
    }
}

fn truncated() -> ModemError {
    ModemError::InvalidData("truncated PDU".to_string())
}

fn swapped_bcd(byte: u8) -> u32 {
    (byte & 0x0F) as u32 * 10 + (byte >> 4) as u32
}

/// Decode a TP-SCTS / TP-DT service-centre timestamp.
pub fn decode_timestamp(data: &[u8]) -> ModemResult<DateTime<FixedOffset>> {
    let [y, mo, d, h, mi, s, tz] = data else {
        return Err(truncated());
    };
    let quarters = ((tz & 0x07) as i32) * 10 + (tz >> 4) as i32;
    let offset = if tz & 0x08 != 0 { -quarters } else { quarters } * 15 * 60;
    let offset = FixedOffset::east_opt(offset)
        .ok_or_else(|| ModemError::InvalidData(format!("bad timezone {:02X}", tz)))?;

    let naive = NaiveDate::from_ymd_opt(2000 + swapped_bcd(*y) as i32, swapped_bcd(*mo), swapped_bcd(*d))
        .and_then(|date| date.and_hms_opt(swapped_bcd(*h), swapped_bcd(*mi), swapped_bcd(*s)))
        .ok_or_else(|| ModemError::InvalidData("bad timestamp".to_string()))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| ModemError::InvalidData("ambiguous timestamp".to_string()))
}

/// GSM-7 user data for `text` after a header of `udh_len` octets.
/// Returns the packed octets and the septet count for TP-UDL.
pub(crate) fn pack_gsm7_user_data(septets: &[u8], udh_len: usize) -> (Vec<u8>, usize) {
    let header_bits = udh_len * 8;
    let fill = (7 - header_bits % 7) % 7;
    let header_septets = (header_bits + fill) / 7;
    (pack_septets(septets, fill), header_septets + septets.len())
}

/// Septets for `text`, `None` when it needs UCS2.
pub(crate) fn gsm7_septets(text: &str) -> Option<Vec<u8>> {
    encode_gsm7(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_semi_octets() {
        assert_eq!(encode_semi_octets("34607123456"), vec![0x43, 0x06, 0x17, 0x32, 0x54, 0xF6]);
        assert_eq!(decode_semi_octets(&[0x43, 0x06, 0x17, 0x32, 0x54, 0xF6], 11), "34607123456");
    }

    #[test]
    fn test_address_encoding() {
        assert_eq!(encode_address("+3460712"), vec![7, 0x91, 0x43, 0x06, 0x17, 0xF2]);
        assert_eq!(encode_smsc(None), vec![0x00]);
        assert_eq!(encode_smsc(Some("+34607003110")), vec![7, 0x91, 0x43, 0x06, 0x07, 0x30, 0x11, 0xF0]);
    }

    #[test]
    fn test_timestamp_decoding() {
        // 2009-12-25 18:30:05 +01:00
        let ts = decode_timestamp(&[0x90, 0x21, 0x52, 0x81, 0x03, 0x50, 0x40]).unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2009, 12, 25));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (18, 30, 5));
        assert_eq!(ts.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_dcs_alphabets() {
        assert_eq!(Alphabet::from_dcs(0x00), Alphabet::Gsm7);
        assert_eq!(Alphabet::from_dcs(0x08), Alphabet::Ucs2);
        assert_eq!(Alphabet::from_dcs(0x04), Alphabet::EightBit);
        assert_eq!(Alphabet::from_dcs(0xF5), Alphabet::EightBit);
        assert_eq!(Alphabet::from_dcs(0xF1), Alphabet::Gsm7);
    }

    #[test]
    fn test_udh_parse() {
        let udh = UserDataHeader::parse(&[0x00, 0x03, 0x2A, 0x03, 0x02]);
        assert_eq!(udh.concat, Some(Concat { reference: 42, count: 3, seq: 2 }));

        let udh = UserDataHeader::parse(&[0x05, 0x04, 0x0B, 0x84, 0x23, 0xF0]);
        assert_eq!(udh.ports, Some((2948, 9200)));
        assert_eq!(udh.concat, None);
    }

    #[test]
    fn test_gsm7_fill_after_header() {
        let septets = gsm7_septets("hi").unwrap();
        let (data, udl) = pack_gsm7_user_data(&septets, 6);
        // 6 header octets + 1 fill bit = 7 septets, plus 2 of text
        assert_eq!(udl, 9);
        assert_eq!(data.len(), 2);
    }
}
