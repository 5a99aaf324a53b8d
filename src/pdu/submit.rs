// ABOUTME: SMS-SUBMIT encoder: splits text into one or more hex PDUs ready for AT+CMGS / AT+CMGW
// ABOUTME: Chooses GSM-7 when every character fits, UCS-2 otherwise, with 8-bit concatenation headers

use super::{Alphabet, UserDataHeader, encode_address, encode_smsc, gsm7_septets, pack_gsm7_user_data};
use crate::datatypes::ErrorKind;
use crate::encoding::hex_encode;
use crate::error::{ModemError, ModemResult};

/// Relative validity period: 4 days.
const VALIDITY_4_DAYS: u8 = 0xAA;

const GSM7_SINGLE: usize = 160;
const GSM7_PART: usize = 153;
const UCS2_SINGLE: usize = 70;
const UCS2_PART: usize = 67;
/// Concatenated messages cannot address more parts than this.
const MAX_PARTS: usize = 255;

/// One encoded part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitPdu {
    /// SMSC field plus TPDU, uppercase hex
    pub pdu: String,
    /// TPDU length in octets, the `<length>` argument of `AT+CMGS`
    pub length: usize,
}

/// Encode `text` for `number`.
///
/// `reference` identifies the parts of a concatenated message. `store`
/// leaves out the validity period, for messages written to the SIM.
pub fn encode_submit(
    number: &str,
    text: &str,
    csca: Option<&str>,
    status_request: bool,
    reference: u8,
    store: bool,
) -> ModemResult<Vec<SubmitPdu>> {
    let (alphabet, chunks) = match gsm7_septets(text) {
        Some(septets) => (Alphabet::Gsm7, split_gsm7(septets)),
        None => (Alphabet::Ucs2, split_ucs2(text)),
    };
    if chunks.len() > MAX_PARTS {
        return Err(ModemError::new(
            ErrorKind::TextTooLong,
            format!("{} parts needed", chunks.len()),
        ));
    }

    let count = chunks.len() as u8;
    let smsc = encode_smsc(csca);
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let udh = (count > 1).then(|| UserDataHeader::concat8(reference, count, i as u8 + 1));
            let tpdu = encode_tpdu(number, alphabet, chunk, udh, status_request, store);
            let mut pdu = smsc.clone();
            pdu.extend(&tpdu);
            Ok(SubmitPdu {
                pdu: hex_encode(&pdu),
                length: tpdu.len(),
            })
        })
        .collect()
}

fn encode_tpdu(
    number: &str,
    alphabet: Alphabet,
    chunk: &[u8],
    udh: Option<Vec<u8>>,
    status_request: bool,
    store: bool,
) -> Vec<u8> {
    // MTI = SMS-SUBMIT
    let mut first = 0x01u8;
    if !store {
        // VPF = relative
        first |= 0x10;
    }
    if status_request {
        first |= 0x20;
    }
    if udh.is_some() {
        first |= 0x40;
    }

    // TP-MR is filled in by the modem
    let mut out = vec![first, 0x00];
    out.extend(encode_address(number));
    out.push(0x00);
    out.push(alphabet.dcs());
    if !store {
        out.push(VALIDITY_4_DAYS);
    }

    let header = udh.unwrap_or_default();
    match alphabet {
        Alphabet::Gsm7 => {
            let (data, udl) = pack_gsm7_user_data(chunk, header.len());
            out.push(udl as u8);
            out.extend(header);
            out.extend(data);
        }
        _ => {
            out.push((header.len() + chunk.len()) as u8);
            out.extend(header);
            out.extend(chunk);
        }
    }
    out
}

/// Split septets into message-sized chunks without separating an escape
/// from the character it introduces.
fn split_gsm7(septets: Vec<u8>) -> Vec<Vec<u8>> {
    if septets.len() <= GSM7_SINGLE {
        return vec![septets];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < septets.len() {
        let mut end = (start + GSM7_PART).min(septets.len());
        if end < septets.len() && septets[end - 1] == 0x1B {
            end -= 1;
        }
        chunks.push(septets[start..end].to_vec());
        start = end;
    }
    chunks
}

/// Split text into UTF-16BE chunks without separating surrogate pairs.
fn split_ucs2(text: &str) -> Vec<Vec<u8>> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let per_part = if units.len() <= UCS2_SINGLE { UCS2_SINGLE } else { UCS2_PART };

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < units.len() || chunks.is_empty() {
        let mut end = (start + per_part).min(units.len());
        if end < units.len() && (0xD800..0xDC00).contains(&units[end - 1]) {
            end -= 1;
        }
        chunks.push(units[start..end].iter().flat_map(|u| u.to_be_bytes()).collect());
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_gsm7_message() {
        let pdus = encode_submit("+3460712", "hello", None, false, 0, false).unwrap();
        assert_eq!(pdus.len(), 1);
        // 00 | 11 00 07 91 43 06 17 F2 00 00 AA 05 E8 32 9B FD 06
        assert_eq!(pdus[0].pdu, "0011000791430617F20000AA05E8329BFD06");
        assert_eq!(pdus[0].length, 17);
    }

    #[test]
    fn test_status_request_flag() {
        let pdus = encode_submit("+3460712", "hello", None, true, 0, false).unwrap();
        assert!(pdus[0].pdu.starts_with("0031"));
    }

    #[test]
    fn test_stored_message_has_no_validity() {
        let pdus = encode_submit("+3460712", "hello", None, false, 0, true).unwrap();
        assert_eq!(pdus[0].pdu, "0001000791430617F2000005E8329BFD06");
    }

    #[test]
    fn test_ucs2_message() {
        let pdus = encode_submit("+3460712", "ĥi", None, false, 0, false).unwrap();
        assert_eq!(pdus.len(), 1);
        assert!(pdus[0].pdu.ends_with("0008AA0401250069"));
    }

    #[test]
    fn test_multipart_gsm7() {
        let text = "a".repeat(200);
        let pdus = encode_submit("+3460712", &text, None, false, 42, false).unwrap();
        assert_eq!(pdus.len(), 2);
        // UDHI set and the concatenation header present in both parts
        assert!(pdus[0].pdu.starts_with("0051"));
        assert!(pdus[0].pdu.contains("0500032A0201"));
        assert!(pdus[1].pdu.contains("0500032A0202"));
    }

    #[test]
    fn test_escape_not_split() {
        let mut text = "a".repeat(152);
        text.push('€');
        text.push_str(&"b".repeat(20));
        let chunks = split_gsm7(gsm7_septets(&text).unwrap());
        assert_eq!(chunks[0].len(), 152);
        assert_eq!(chunks[1][0], 0x1B);
    }

    #[test]
    fn test_multipart_ucs2_keeps_surrogates() {
        let text = format!("{}😀", "ж".repeat(66));
        let chunks = split_ucs2(&format!("{}{}", text, "ж".repeat(10)));
        assert_eq!(chunks[0].len(), 66 * 2);
    }

    #[test]
    fn test_empty_text_gives_one_part() {
        let pdus = encode_submit("123", "", None, false, 0, false).unwrap();
        assert_eq!(pdus.len(), 1);
        assert_eq!(split_ucs2("").len(), 1);
    }
}
