// ABOUTME: SMS message model: single fragments read from the SIM and assembled multipart messages
// ABOUTME: Holds logical and on-SIM indexes, concatenation data and delivery-report bookkeeping

use crate::error::ModemResult;
use crate::pdu::{Alphabet, DecodedPdu, PduKind, SubmitPdu, decode_pdu, encode_submit};
use chrono::{DateTime, FixedOffset};
use std::fmt;

/// Seconds two fragments of one message may differ in their timestamps.
pub const SMS_DATE_THRESHOLD: i64 = 5;

/// Storage status reported by `+CMGL`/`+CMGR`.
pub const STO_UNREAD: u32 = 0;
pub const STO_READ: u32 = 1;
pub const STO_UNSENT: u32 = 2;
pub const STO_SENT: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Fragment {
    seq: u8,
    text: String,
    data: Vec<u8>,
}

/// One SMS, possibly assembled from several fragments.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub number: String,
    /// Logical index assigned by the message layer
    pub index: Option<u32>,
    /// On-SIM slots holding the fragments, sorted
    pub real_indexes: Vec<u32>,
    /// Storage status, see the `STO_*` constants
    pub storage_status: Option<u32>,
    pub csca: Option<String>,
    pub datetime: Option<DateTime<FixedOffset>>,
    pub fmt: Alphabet,
    pub kind: PduKind,
    /// Concatenation reference, count and sequence; count 0 for single part
    pub reference: u16,
    pub cnt: u8,
    pub seq: u8,
    pub completed: bool,
    pub status_request: bool,
    /// Message references still waiting for a delivery report
    pub status_references: Vec<u32>,
    /// Reference reported in the `Delivered` signal
    pub status_reference: Option<u32>,
    /// TP-MR of a status report
    pub report_reference: Option<u32>,
    fragments: Vec<Fragment>,
}

impl Message {
    /// Outgoing message with complete text.
    pub fn new(number: impl Into<String>, text: impl Into<String>) -> Message {
        let text = text.into();
        Message {
            number: number.into(),
            fragments: vec![Fragment {
                seq: 0,
                data: text.as_bytes().to_vec(),
                text,
            }],
            completed: true,
            kind: PduKind::Submit,
            ..Default::default()
        }
    }

    pub fn with_csca(mut self, csca: Option<String>) -> Self {
        self.csca = csca.filter(|c| !c.is_empty());
        self
    }

    pub fn with_status_request(mut self, status_request: bool) -> Self {
        self.status_request = status_request;
        self
    }

    /// Build a single fragment from a PDU stored at `real_index`.
    pub fn from_pdu(hex: &str, real_index: Option<u32>, storage_status: Option<u32>) -> ModemResult<Message> {
        let pdu = decode_pdu(hex)?;
        Ok(Message::from_decoded(pdu, real_index, storage_status))
    }

    pub fn from_decoded(pdu: DecodedPdu, real_index: Option<u32>, storage_status: Option<u32>) -> Message {
        let (reference, cnt, seq) = pdu
            .udh
            .concat
            .map(|c| (c.reference, c.count, c.seq))
            .unwrap_or((0, 0, 0));
        // A "concatenated" message of one part is a plain message
        let (cnt, seq) = if cnt <= 1 { (0, 0) } else { (cnt, seq) };

        Message {
            number: pdu.number,
            index: real_index,
            real_indexes: real_index.into_iter().collect(),
            storage_status,
            csca: pdu.csca,
            datetime: pdu.datetime,
            fmt: pdu.alphabet,
            kind: pdu.kind,
            reference,
            cnt,
            seq,
            completed: cnt == 0,
            status_request: pdu.status_request,
            report_reference: pdu.reference.map(u32::from),
            fragments: vec![Fragment {
                seq,
                text: pdu.text,
                data: pdu.data,
            }],
            ..Default::default()
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.cnt > 0
    }

    /// Whether the sequence number lies within `1..=cnt`.
    pub fn has_valid_seq(&self) -> bool {
        (1..=self.cnt).contains(&self.seq)
    }

    pub fn is_status_report(&self) -> bool {
        self.kind == PduKind::StatusReport
    }

    /// Fragments received so far.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Assembled text, fragments in sequence order.
    pub fn text(&self) -> String {
        self.sorted().map(|f| f.text.as_str()).collect()
    }

    /// Assembled raw user data, fragments in sequence order.
    pub fn data(&self) -> Vec<u8> {
        self.sorted().flat_map(|f| f.data.iter().copied()).collect()
    }

    fn sorted(&self) -> impl Iterator<Item = &Fragment> {
        let mut fragments: Vec<&Fragment> = self.fragments.iter().collect();
        fragments.sort_by_key(|f| f.seq);
        fragments.into_iter()
    }

    /// Whether `fragment` is another part of this (incomplete) message.
    pub fn accepts(&self, fragment: &Message) -> bool {
        if self.completed || !fragment.is_multipart() || !fragment.has_valid_seq() {
            return false;
        }
        if self.reference != fragment.reference || self.cnt != fragment.cnt {
            return false;
        }
        if let (Some(a), Some(b)) = (self.datetime, fragment.datetime) {
            if (a - b).num_seconds().abs() > SMS_DATE_THRESHOLD {
                return false;
            }
        }
        self.number == fragment.number && self.csca == fragment.csca
    }

    /// Absorb the fragments and slots of `fragment`. Returns whether the
    /// message is now complete, that is every sequence number from 1 to
    /// `cnt` is present. A repeated sequence number replaces the earlier
    /// copy; parts outside that range are ignored.
    pub fn append(&mut self, fragment: Message) -> bool {
        let cnt = self.cnt;
        for part in fragment.fragments {
            if !(1..=cnt).contains(&part.seq) {
                continue;
            }
            self.fragments.retain(|f| f.seq != part.seq);
            self.fragments.push(part);
        }
        self.real_indexes.extend(fragment.real_indexes);
        self.real_indexes.sort_unstable();
        self.real_indexes.dedup();
        self.completed = (1..=cnt).all(|seq| self.fragments.iter().any(|f| f.seq == seq));
        self.completed
    }

    /// Encode for sending (or storing, which drops the validity period).
    pub fn to_pdus(&self, reference: u8, store: bool) -> ModemResult<Vec<SubmitPdu>> {
        encode_submit(
            &self.number,
            &self.text(),
            self.csca.as_deref(),
            self.status_request,
            reference,
            store,
        )
    }

    /// Seconds since the epoch of the service-centre timestamp.
    pub fn timestamp(&self) -> Option<i64> {
        self.datetime.map(|dt| dt.timestamp())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("number", &self.number)
            .field("index", &self.index)
            .field("real_indexes", &self.real_indexes)
            .field("csca", &self.csca)
            .field("datetime", &self.datetime)
            .field("reference", &self.reference)
            .field("count", &self.cnt)
            .field("sequence", &self.seq)
            .field("completed", &self.completed)
            .field("text", &self.text())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::Concat;
    use crate::pdu::encode_deliver_fixture as encode_deliver;

    const SENDER: &str = "+447700900123";
    const SMSC: &str = "+447785016005";

    fn part(seq: u8, text: &str, slot: u32, seconds: u8) -> Message {
        let concat = Concat { reference: 42, count: 3, seq };
        let hex = encode_deliver(SENDER, SMSC, text, Some(concat), seconds);
        Message::from_pdu(&hex, Some(slot), Some(STO_UNREAD)).unwrap()
    }

    #[test]
    fn test_single_part_is_complete() {
        let hex = encode_deliver(SENDER, SMSC, "hi there", None, 0);
        let sms = Message::from_pdu(&hex, Some(4), Some(STO_READ)).unwrap();
        assert!(sms.completed);
        assert!(!sms.is_multipart());
        assert_eq!(sms.text(), "hi there");
        assert_eq!(sms.real_indexes, vec![4]);
        assert_eq!(sms.csca.as_deref(), Some(SMSC));
    }

    #[test]
    fn test_fragments_assemble_in_sequence_order() {
        let mut sms = part(3, "space", 7, 0);
        assert!(!sms.completed);
        assert!(sms.accepts(&part(1, "Hello ", 2, 1)));
        assert!(!sms.append(part(1, "Hello ", 2, 1)));
        assert!(sms.append(part(2, "from ", 5, 2)));
        assert_eq!(sms.text(), "Hello from space");
        assert_eq!(sms.real_indexes, vec![2, 5, 7]);
        assert_eq!(sms.fragment_count(), 3);
    }

    #[test]
    fn test_rejects_foreign_fragments() {
        let sms = part(1, "Hello ", 1, 0);
        // too far apart in time
        assert!(!sms.accepts(&part(2, "from ", 2, 9)));

        let other_sender = Message {
            number: "+34600000000".to_string(),
            ..part(2, "from ", 2, 0)
        };
        assert!(!sms.accepts(&other_sender));

        let other_ref = Message {
            reference: 43,
            ..part(2, "from ", 2, 0)
        };
        assert!(!sms.accepts(&other_ref));
    }

    #[test]
    fn test_out_of_range_parts_never_complete() {
        let mut sms = part(1, "Hello ", 1, 0);
        assert!(!sms.accepts(&part(7, "bogus", 9, 0)));
        assert!(!sms.accepts(&part(0, "bogus", 9, 0)));
        assert!(!part(7, "bogus", 9, 0).has_valid_seq());

        assert!(!sms.append(part(2, "from ", 2, 0)));
        assert!(!sms.append(part(7, "bogus", 9, 0)));
        assert!(!sms.completed);
        assert_eq!(sms.fragment_count(), 2);
        assert!(sms.append(part(3, "space", 3, 0)));
        assert_eq!(sms.text(), "Hello from space");
    }

    #[test]
    fn test_outgoing_message() {
        let sms = Message::new("+3460712", "hello")
            .with_status_request(true)
            .with_csca(Some(String::new()));
        assert!(sms.completed);
        assert_eq!(sms.csca, None);
        let pdus = sms.to_pdus(0, false).unwrap();
        assert!(pdus[0].pdu.starts_with("0031"));
    }
}
