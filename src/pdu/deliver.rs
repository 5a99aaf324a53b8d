// ABOUTME: Decoder for PDUs read back from the modem: SMS-DELIVER, stored SMS-SUBMIT and STATUS-REPORT
// ABOUTME: Produces the sender, timestamps, concatenation info and decoded text of one fragment

use super::{Alphabet, Reader, UserDataHeader};
use crate::encoding::{decode_gsm7, hex_decode, ucs2_from_bytes, unpack_septets};
use crate::error::{ModemError, ModemResult};
use chrono::{DateTime, FixedOffset};

/// Message type indicator of a decoded PDU.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum PduKind {
    #[default]
    Deliver,
    Submit,
    StatusReport,
}

/// One decoded PDU.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedPdu {
    pub kind: PduKind,
    /// Originator (deliver), destination (submit) or recipient (report)
    pub number: String,
    pub csca: Option<String>,
    /// Service-centre timestamp
    pub datetime: Option<DateTime<FixedOffset>>,
    pub alphabet: Alphabet,
    pub udh: UserDataHeader,
    /// Raw user data after the header
    pub data: Vec<u8>,
    pub text: String,
    /// TP-MR of submits and status reports
    pub reference: Option<u8>,
    /// TP-ST of status reports
    pub status: Option<u8>,
    pub status_request: bool,
}

/// Decode a hex PDU including its leading SMSC field.
pub fn decode_pdu(hex: &str) -> ModemResult<DecodedPdu> {
    let bytes = hex_decode(hex).ok_or_else(|| ModemError::InvalidData(format!("not a PDU: {:?}", hex)))?;
    let mut r = Reader::new(&bytes);

    let csca = r.smsc()?;
    let first = r.u8()?;
    let mut pdu = DecodedPdu {
        csca,
        ..Default::default()
    };

    match first & 0x03 {
        0x00 => {
            pdu.kind = PduKind::Deliver;
            pdu.status_request = first & 0x20 != 0;
            pdu.number = r.address()?;
            let _pid = r.u8()?;
            let dcs = r.u8()?;
            pdu.datetime = Some(r.timestamp()?);
            decode_user_data(&mut r, &mut pdu, dcs, first & 0x40 != 0)?;
        }
        0x01 => {
            pdu.kind = PduKind::Submit;
            pdu.status_request = first & 0x20 != 0;
            pdu.reference = Some(r.u8()?);
            pdu.number = r.address()?;
            let _pid = r.u8()?;
            let dcs = r.u8()?;
            match (first >> 3) & 0x03 {
                0x00 => {}
                0x02 => {
                    r.u8()?;
                }
                _ => {
                    r.take(7)?;
                }
            }
            decode_user_data(&mut r, &mut pdu, dcs, first & 0x40 != 0)?;
        }
        0x02 => {
            pdu.kind = PduKind::StatusReport;
            pdu.reference = Some(r.u8()?);
            pdu.number = r.address()?;
            pdu.datetime = Some(r.timestamp()?);
            let _discharge = r.timestamp()?;
            pdu.status = Some(r.u8()?);
        }
        other => {
            return Err(ModemError::InvalidData(format!("reserved message type {}", other)));
        }
    }
    Ok(pdu)
}

fn decode_user_data(r: &mut Reader<'_>, pdu: &mut DecodedPdu, dcs: u8, udhi: bool) -> ModemResult<()> {
    pdu.alphabet = Alphabet::from_dcs(dcs);
    let udl = r.u8()? as usize;
    let ud = r.rest();

    let (udh_len, header) = if udhi {
        let len = *ud.first().ok_or_else(|| ModemError::InvalidData("missing UDH".to_string()))? as usize;
        let header = ud
            .get(1..1 + len)
            .ok_or_else(|| ModemError::InvalidData("truncated UDH".to_string()))?;
        (len + 1, header)
    } else {
        (0, &[][..])
    };
    pdu.udh = UserDataHeader::parse(header);

    match pdu.alphabet {
        Alphabet::Gsm7 => {
            let header_bits = udh_len * 8;
            let fill = (7 - header_bits % 7) % 7;
            let header_septets = (header_bits + fill) / 7;
            let count = udl.saturating_sub(header_septets);
            let septets = unpack_septets(ud.get(udh_len..).unwrap_or(&[]), count, fill);
            pdu.text = decode_gsm7(&septets);
            pdu.data = septets;
        }
        Alphabet::Ucs2 => {
            let end = udl.min(ud.len());
            let body = ud.get(udh_len..end).unwrap_or(&[]);
            pdu.text = ucs2_from_bytes(body)?;
            pdu.data = body.to_vec();
        }
        Alphabet::EightBit => {
            let end = udl.min(ud.len());
            let body = ud.get(udh_len..end).unwrap_or(&[]);
            pdu.text = String::from_utf8_lossy(body).into_owned();
            pdu.data = body.to_vec();
        }
    }
    Ok(())
}

/// Build an SMS-DELIVER fixture from `number` via `smsc`, GSM-7 coded,
/// stamped 2009-12-25 18:30:05 +01:00 plus `seconds`.
#[cfg(test)]
pub(crate) fn encode_deliver(
    number: &str,
    smsc: &str,
    text: &str,
    concat: Option<super::Concat>,
    seconds: u8,
) -> String {
    use super::{encode_address, encode_smsc, gsm7_septets, pack_gsm7_user_data};

    let mut out = encode_smsc(Some(smsc));
    out.push(if concat.is_some() { 0x44 } else { 0x04 });
    out.extend(encode_address(number));
    out.extend([0x00, 0x00]);
    let secs = ((seconds % 10) << 4) | (seconds / 10);
    out.extend([0x90, 0x21, 0x52, 0x81, 0x03, secs, 0x40]);

    let header = concat
        .map(|c| UserDataHeader::concat8(c.reference as u8, c.count, c.seq))
        .unwrap_or_default();
    let septets = gsm7_septets(text).unwrap_or_default();
    let (data, udl) = pack_gsm7_user_data(&septets, header.len());
    out.push(udl as u8);
    out.extend(header);
    out.extend(data);
    crate::encoding::hex_encode(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{Concat, encode_submit};

    #[test]
    fn test_fixture_encoder_matches_decoder() {
        let concat = Concat { reference: 42, count: 3, seq: 2 };
        let hex = encode_deliver("+34607123456", "+34607003110", "from ", Some(concat), 3);
        let pdu = decode_pdu(&hex).unwrap();
        assert_eq!(pdu.text, "from ");
        assert_eq!(pdu.udh.concat, Some(concat));
        assert_eq!(pdu.number, "+34607123456");
    }

    #[test]
    fn test_decode_deliver() {
        // From +34607123456 via +34607003110, "hello", 2009-12-25 18:30:05 +01:00
        let hex = "07914306073011F0 04 0B914306173254F6 0000 90215281035040 05 E8329BFD06".replace(' ', "");
        let pdu = decode_pdu(&hex).unwrap();
        assert_eq!(pdu.kind, PduKind::Deliver);
        assert_eq!(pdu.number, "+34607123456");
        assert_eq!(pdu.csca.as_deref(), Some("+34607003110"));
        assert_eq!(pdu.text, "hello");
        assert_eq!(pdu.alphabet, Alphabet::Gsm7);
        assert!(pdu.udh.concat.is_none());
    }

    #[test]
    fn test_decode_concatenated_deliver() {
        // UDHI, 8-bit reference 42, part 1 of 3, text "Hello "
        let hex = "07914306073011F0 44 0B914306173254F6 0000 90215281035040 0D 0500032A0301 906536FB0D02"
            .replace(' ', "");
        let pdu = decode_pdu(&hex).unwrap();
        assert_eq!(pdu.udh.concat, Some(Concat { reference: 42, count: 3, seq: 1 }));
        assert_eq!(pdu.text, "Hello ");
    }

    #[test]
    fn test_decode_stored_submit() {
        let encoded = encode_submit("+3460712", "hello", None, true, 0, false).unwrap();
        let pdu = decode_pdu(&encoded[0].pdu).unwrap();
        assert_eq!(pdu.kind, PduKind::Submit);
        assert_eq!(pdu.number, "+3460712");
        assert_eq!(pdu.text, "hello");
        assert!(pdu.status_request);
        assert_eq!(pdu.csca, None);
    }

    #[test]
    fn test_decode_status_report() {
        // MR 17, recipient +34607123456, delivered (status 0)
        let hex = "0006110B914306173254F6 90215281035040 90215281035140 00".replace(' ', "");
        let pdu = decode_pdu(&hex).unwrap();
        assert_eq!(pdu.kind, PduKind::StatusReport);
        assert_eq!(pdu.reference, Some(17));
        assert_eq!(pdu.status, Some(0));
        assert_eq!(pdu.number, "+34607123456");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_pdu("zz").is_err());
        assert!(decode_pdu("0004").is_err());
    }
}
