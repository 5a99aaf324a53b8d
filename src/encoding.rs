// ABOUTME: Text encodings spoken by modems: UCS2 hex strings, the GSM 03.38 alphabet and septet packing
// ABOUTME: Every helper takes the charset explicitly; nothing reads a global encoding setting

use crate::datatypes::Charset;
use crate::error::{ModemError, ModemResult};
use crate::datatypes::ErrorKind;

const ESCAPE: u8 = 0x1B;

/// GSM 03.38 default alphabet, indexed by septet value.
const GSM_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞ\u{1b}ÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// Extension table reached through the escape septet.
const GSM_EXTENSION: [(u8, char); 10] = [
    (0x0A, '\u{0c}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

/// Uppercase hex representation of `bytes`.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Decode a hex string, accepting either case. `None` on odd length or
/// non-hex digits.
pub fn hex_decode(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// Encode `s` as UTF-16BE and return it as uppercase hex.
pub fn pack_ucs2_bytes(s: &str) -> String {
    let bytes: Vec<u8> = s.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect();
    hex_encode(&bytes)
}

/// Decode an UTF-16BE hex string.
pub fn unpack_ucs2_bytes(s: &str) -> ModemResult<String> {
    let bytes = hex_decode(s)
        .ok_or_else(|| ModemError::new(ErrorKind::CharsetError, format!("not hex: {:?}", s)))?;
    ucs2_from_bytes(&bytes)
}

/// Decode raw UTF-16BE octets.
pub fn ucs2_from_bytes(bytes: &[u8]) -> ModemResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(ModemError::new(
            ErrorKind::CharsetError,
            "odd number of UCS2 octets",
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|e| ModemError::new(ErrorKind::CharsetError, e.to_string()))
}

/// Whether `s` looks like an UCS2 hex string: it starts with `00` and
/// decodes cleanly.
pub fn check_if_ucs2(s: &str) -> bool {
    s.starts_with("00") && unpack_ucs2_bytes(s).is_ok()
}

/// Decode `s` from UCS2 if it is UCS2, otherwise return it unchanged.
pub fn from_ucs2(s: &str) -> String {
    if check_if_ucs2(s) {
        unpack_ucs2_bytes(s).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Encode a payload string for a modem running `charset`.
pub fn encode_text(s: &str, charset: Charset) -> String {
    match charset {
        Charset::Ucs2 => pack_ucs2_bytes(s),
        Charset::Ira | Charset::Gsm => s.to_string(),
    }
}

/// Decode a reply string from a modem running `charset`.
///
/// Under UCS2 any hex string made of whole code units is decoded,
/// whatever its first code point. Anything else comes back unchanged.
pub fn decode_text(s: &str, charset: Charset) -> String {
    match charset {
        Charset::Ucs2 if s.len() % 4 == 0 => {
            unpack_ucs2_bytes(s).unwrap_or_else(|_| s.to_string())
        }
        Charset::Ucs2 | Charset::Ira | Charset::Gsm => s.to_string(),
    }
}

/// Map `text` onto GSM 03.38 septets, escaping extension characters.
/// Returns `None` if any character is outside the alphabet.
pub fn encode_gsm7(text: &str) -> Option<Vec<u8>> {
    let mut septets = Vec::with_capacity(text.len());
    for ch in text.chars() {
        if let Some(pos) = GSM_BASIC.chars().position(|c| c == ch && c != '\u{1b}') {
            septets.push(pos as u8);
        } else if let Some((code, _)) = GSM_EXTENSION.iter().find(|(_, c)| *c == ch) {
            septets.push(ESCAPE);
            septets.push(*code);
        } else {
            return None;
        }
    }
    Some(septets)
}

/// Map GSM 03.38 septets back onto text.
pub fn decode_gsm7(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut iter = septets.iter().copied();
    while let Some(septet) = iter.next() {
        if septet == ESCAPE {
            match iter.next() {
                Some(code) => match GSM_EXTENSION.iter().find(|(c, _)| *c == code) {
                    Some((_, ch)) => out.push(*ch),
                    None => out.push(' '),
                },
                None => break,
            }
        } else if let Some(ch) = GSM_BASIC.chars().nth((septet & 0x7F) as usize) {
            out.push(ch);
        }
    }
    out
}

/// Whether every character of `text` is representable in GSM 03.38.
pub fn is_gsm7(text: &str) -> bool {
    encode_gsm7(text).is_some()
}

/// Pack septets into octets, least significant bit first, after
/// `fill_bits` leading padding bits.
pub fn pack_septets(septets: &[u8], fill_bits: usize) -> Vec<u8> {
    let total_bits = fill_bits + septets.len() * 7;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    for (i, septet) in septets.iter().enumerate() {
        let start = fill_bits + i * 7;
        for bit in 0..7 {
            if (septet >> bit) & 1 == 1 {
                let pos = start + bit;
                out[pos / 8] |= 1 << (pos % 8);
            }
        }
    }
    out
}

/// Unpack `count` septets from `data`, skipping `fill_bits` leading bits.
pub fn unpack_septets(data: &[u8], count: usize, fill_bits: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = fill_bits + i * 7;
        let mut septet = 0u8;
        for bit in 0..7 {
            let pos = start + bit;
            match data.get(pos / 8) {
                Some(byte) if (byte >> (pos % 8)) & 1 == 1 => septet |= 1 << bit,
                Some(_) => {}
                None => return out,
            }
        }
        out.push(septet);
    }
    out
}

/// Decode a SIM phonebook name stored in one of the TS 31.101 annex A
/// UCS2 layouts (`80`, `81` or `82` prefixed hex).
pub fn unpack_ucs2_ts31101(hex: &str) -> ModemResult<String> {
    let bytes = hex_decode(hex)
        .ok_or_else(|| ModemError::new(ErrorKind::CharsetError, format!("not hex: {:?}", hex)))?;
    let bad = || ModemError::new(ErrorKind::CharsetError, format!("truncated name {:?}", hex));

    match bytes.first() {
        Some(0x80) => {
            let mut body = &bytes[1..];
            while body.len() >= 2 && body[body.len() - 2..] == [0xFF, 0xFF] {
                body = &body[..body.len() - 2];
            }
            ucs2_from_bytes(body)
        }
        Some(0x81) => {
            let len = *bytes.get(1).ok_or_else(bad)? as usize;
            let base = (*bytes.get(2).ok_or_else(bad)? as u32) << 7;
            decode_ts31101_body(bytes.get(3..).ok_or_else(bad)?, len, base)
        }
        Some(0x82) => {
            let len = *bytes.get(1).ok_or_else(bad)? as usize;
            let hi = *bytes.get(2).ok_or_else(bad)? as u32;
            let lo = *bytes.get(3).ok_or_else(bad)? as u32;
            decode_ts31101_body(bytes.get(4..).ok_or_else(bad)?, len, (hi << 8) | lo)
        }
        _ => Err(ModemError::new(
            ErrorKind::CharsetError,
            format!("unsupported name encoding {:?}", hex),
        )),
    }
}

fn decode_ts31101_body(body: &[u8], len: usize, base: u32) -> ModemResult<String> {
    let mut out = String::new();
    for byte in body.iter().take(len) {
        if byte & 0x80 == 0 {
            out.push_str(&decode_gsm7(&[*byte]));
        } else {
            let ch = char::from_u32(base + (*byte as u32 & 0x7F)).ok_or_else(|| {
                ModemError::new(ErrorKind::CharsetError, "invalid code point")
            })?;
            out.push(ch);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gsm_alphabet_size() {
        assert_eq!(GSM_BASIC.chars().count(), 128);
    }

    #[test]
    fn test_pack_ucs2_is_uppercase() {
        assert_eq!(pack_ucs2_bytes("*100#"), "002A0031003000300023");
        assert_eq!(pack_ucs2_bytes("ñ"), "00F1");
    }

    #[test]
    fn test_unpack_ucs2_is_case_insensitive() {
        assert_eq!(unpack_ucs2_bytes("00420061006c").unwrap(), "Bal");
        assert_eq!(unpack_ucs2_bytes("00420061006C").unwrap(), "Bal");
    }

    #[test]
    fn test_check_if_ucs2() {
        assert!(check_if_ucs2("0041"));
        assert!(!check_if_ucs2("4100"));
        assert!(!check_if_ucs2("00G1"));
        assert!(!check_if_ucs2("004"));
        assert_eq!(from_ucs2("+34600000000"), "+34600000000");
    }

    #[test]
    fn test_charset_round_trip() {
        for text in ["Hola", "€uro", "日本", ""] {
            let encoded = encode_text(text, Charset::Ucs2);
            assert_eq!(unpack_ucs2_bytes(&encoded).unwrap(), text);
        }
        assert_eq!(decode_text("plain", Charset::Ira), "plain");
    }

    #[test]
    fn test_ucs2_decodes_whatever_the_first_code_point() {
        for text in ["Анна", "日本語", "Ελλάδα", "Ana"] {
            let encoded = encode_text(text, Charset::Ucs2);
            assert_eq!(decode_text(&encoded, Charset::Ucs2), text);
        }
        assert_eq!(decode_text("0410043D043D0430", Charset::Ucs2), "Анна");
        assert_eq!(decode_text("+3460", Charset::Ucs2), "+3460");
        assert_eq!(decode_text("D800", Charset::Ucs2), "D800");
    }

    #[test]
    fn test_gsm7_escapes() {
        let septets = encode_gsm7("a{b}€").unwrap();
        assert_eq!(septets, vec![0x61, 0x1B, 0x28, 0x62, 0x1B, 0x29, 0x1B, 0x65]);
        assert_eq!(decode_gsm7(&septets), "a{b}€");
        assert!(encode_gsm7("日本").is_none());
    }

    #[test]
    fn test_septet_packing() {
        // "hellohello" from 3GPP TS 23.038 examples
        let septets = encode_gsm7("hellohello").unwrap();
        let packed = pack_septets(&septets, 0);
        assert_eq!(hex_encode(&packed), "E8329BFD4697D9EC37");
        assert_eq!(unpack_septets(&packed, 10, 0), septets);
    }

    #[test]
    fn test_septet_packing_with_fill_bits() {
        let septets = encode_gsm7("abc").unwrap();
        let packed = pack_septets(&septets, 1);
        assert_eq!(unpack_septets(&packed, 3, 1), septets);
    }

    #[test]
    fn test_ts31101_layouts() {
        assert_eq!(unpack_ucs2_ts31101("80004100420043FFFF").unwrap(), "ABC");
        // 0x81: two chars, base 0x0A << 7 = 0x0500, one GSM char then one UCS2 offset
        assert_eq!(unpack_ucs2_ts31101("81020A4181").unwrap(), "A\u{0501}");
        assert_eq!(unpack_ucs2_ts31101("8202050041C1").unwrap(), "A\u{0541}");
    }
}
