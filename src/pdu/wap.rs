// ABOUTME: WAP push (WSP) unwrapping and MMS encapsulation coding for notifications and messages
// ABOUTME: Decodes MMS headers and multipart bodies, encodes m-send-req and m-notifyresp-ind

use crate::error::{ModemError, ModemResult};
use crate::signals::MmsHeaders;

/// WSP PDU type of a push.
const WSP_PUSH: u8 = 0x06;

const BCC: u8 = 0x01;
const CC: u8 = 0x02;
const CONTENT_TYPE: u8 = 0x04;
const DELIVERY_REPORT: u8 = 0x06;
const FROM: u8 = 0x09;
const MESSAGE_CLASS: u8 = 0x0A;
const MESSAGE_TYPE: u8 = 0x0C;
const MMS_VERSION: u8 = 0x0D;
const PRIORITY: u8 = 0x0F;
const READ_REPLY: u8 = 0x10;
const STATUS: u8 = 0x15;
const SUBJECT: u8 = 0x16;
const TO: u8 = 0x17;
const TRANSACTION_ID: u8 = 0x18;

const M_SEND_REQ: u8 = 0x80;
const M_NOTIFYRESP_IND: u8 = 0x83;
const STATUS_RETRIEVED: u8 = 0x81;
const VERSION_1_0: u8 = 0x90;
/// From header value asking the MMSC to fill in our address.
const INSERT_ADDRESS: u8 = 0x81;

/// Quote for text whose first octet would read as a short integer.
const QUOTE: u8 = 0x7F;

const MULTIPART_MIXED: &str = "application/vnd.wap.multipart.mixed";

/// WSP well-known content types used by MMS.
const CONTENT_TYPES: [(u8, &str); 13] = [
    (0x01, "text/*"),
    (0x02, "text/html"),
    (0x03, "text/plain"),
    (0x07, "text/x-vCard"),
    (0x08, "text/vnd.wap.wml"),
    (0x0C, "multipart/mixed"),
    (0x1D, "image/gif"),
    (0x1E, "image/jpeg"),
    (0x20, "image/png"),
    (0x21, "image/vnd.wap.wbmp"),
    (0x23, MULTIPART_MIXED),
    (0x33, "application/vnd.wap.multipart.related"),
    (0x3E, "application/vnd.wap.mms-message"),
];

/// WSP well-known parameters inside a content type value.
const PARAMETERS: [(u8, &str); 6] = [
    (0x01, "Charset"),
    (0x05, "Name"),
    (0x06, "Filename"),
    (0x09, "Type"),
    (0x0A, "Start"),
    (0x0B, "Start-info"),
];

/// IANA MIBenum values of the charsets seen in MMS parts.
const CHARSETS: [(u16, &str); 4] = [
    (0x03, "us-ascii"),
    (0x04, "iso-8859-1"),
    (0x6A, "utf-8"),
    (0x03E8, "iso-10646-ucs-2"),
];

/// One entry of a multipart MMS body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MmsPart {
    pub content_type: String,
    /// Content type parameters such as `Charset` or `Name`
    pub parameters: MmsHeaders,
    pub data: Vec<u8>,
}

impl MmsPart {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> MmsPart {
        MmsPart {
            content_type: content_type.into(),
            parameters: MmsHeaders::new(),
            data,
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }
}

/// A decoded WAP push carrying an MMS notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MmsNotification {
    pub transaction_id: String,
    /// Content type announced by the push itself
    pub content_type: String,
    /// MMS headers of the notification body
    pub headers: MmsHeaders,
}

impl MmsNotification {
    pub fn from(&self) -> &str {
        self.headers.get("From").map(String::as_str).unwrap_or("")
    }

    pub fn content_location(&self) -> Option<&str> {
        self.headers.get("Content-Location").map(String::as_str)
    }

    /// Headers as exported to clients, `Content-Type` taken from the push.
    pub fn exported_headers(&self) -> MmsHeaders {
        let mut headers = self.headers.clone();
        headers.insert("Content-Type".to_string(), self.content_type.clone());
        headers
    }
}

/// Whether 8-bit user data looks like a WSP push.
pub fn is_wap_push(data: &[u8]) -> bool {
    data.len() > 2 && data[1] == WSP_PUSH
}

/// Unwrap a WSP push and decode the MMS notification it carries.
pub fn extract_push_notification(data: &[u8]) -> ModemResult<MmsNotification> {
    if !is_wap_push(data) {
        return Err(ModemError::InvalidData("not a WAP push".to_string()));
    }
    let mut r = Cursor::new(&data[2..]);
    let headers_len = r.uintvar()? as usize;
    let headers = r.take(headers_len)?;
    let body = r.rest();

    let content_type = Cursor::new(headers).content_type()?;
    let (headers, _) = decode_mms_headers(body)?;
    let transaction_id = headers
        .get("Transaction-Id")
        .cloned()
        .ok_or_else(|| ModemError::InvalidData("notification without Transaction-Id".to_string()))?;

    Ok(MmsNotification {
        transaction_id,
        content_type,
        headers,
    })
}

/// Decode MMS encapsulation headers. Returns the headers and the offset
/// of the body, which starts right after `Content-Type`.
pub fn decode_mms_headers(data: &[u8]) -> ModemResult<(MmsHeaders, usize)> {
    let mut headers = MmsHeaders::new();
    let mut r = Cursor::new(data);

    while !r.is_empty() {
        let first = r.u8()?;
        if first & 0x80 == 0 {
            // Application header: name and value as text
            r.pos -= 1;
            let name = r.text()?;
            let value = r.text()?;
            headers.insert(name, value);
            continue;
        }

        let field = first & 0x7F;
        let value = match field {
            MESSAGE_TYPE => message_type_name(r.u8()?),
            MMS_VERSION => {
                let v = r.u8()? & 0x7F;
                format!("{}.{}", v >> 4, v & 0x0F)
            }
            0x0A => match r.peek()? {
                0x80 => token(&mut r, "Personal")?,
                0x81 => token(&mut r, "Advertisement")?,
                0x82 => token(&mut r, "Informational")?,
                0x83 => token(&mut r, "Auto")?,
                _ => r.text()?,
            },
            0x05 | 0x0E => r.long_integer()?.to_string(),
            0x07 | 0x08 => {
                let len = r.value_length()?;
                let mut inner = Cursor::new(r.take(len)?);
                let _absolute_or_relative = inner.u8()?;
                inner.long_integer()?.to_string()
            }
            0x09 => {
                let len = r.value_length()?;
                let mut inner = Cursor::new(r.take(len)?);
                match inner.u8()? {
                    0x80 => inner.encoded_string()?,
                    _ => String::new(),
                }
            }
            0x01 | 0x02 | 0x16 | 0x17 | 0x13 => r.encoded_string()?,
            0x03 | 0x0B | TRANSACTION_ID => r.text()?,
            STATUS => status_name(r.u8()?),
            0x0F => match r.u8()? {
                0x80 => "Low".to_string(),
                0x82 => "High".to_string(),
                _ => "Normal".to_string(),
            },
            0x06 | 0x10 | 0x11 | 0x14 => match r.u8()? {
                0x80 => "Yes".to_string(),
                _ => "No".to_string(),
            },
            CONTENT_TYPE => {
                let content_type = r.content_type()?;
                headers.insert(field_name(field).to_string(), content_type);
                return Ok((headers, r.pos));
            }
            _ => r.generic_value()?,
        };
        headers.insert(field_name(field).to_string(), value);
    }
    Ok((headers, r.pos))
}

/// Decode the entries of an `application/vnd.wap.multipart.*` body.
pub fn decode_multipart(body: &[u8]) -> ModemResult<Vec<MmsPart>> {
    let mut r = Cursor::new(body);
    let count = r.uintvar()?;
    let mut parts = Vec::new();
    for _ in 0..count {
        let headers_len = r.uintvar()? as usize;
        let data_len = r.uintvar()? as usize;
        let (content_type, parameters) = Cursor::new(r.take(headers_len)?).content_type_with_params()?;
        parts.push(MmsPart {
            content_type,
            parameters,
            data: r.take(data_len)?.to_vec(),
        });
    }
    Ok(parts)
}

/// Encode an m-send-req carrying `parts`.
///
/// `Transaction-Id` and `To` must be present. Only the headers a sender
/// may set are written; `From` is always left for the MMSC to insert.
pub fn encode_send_req(headers: &MmsHeaders, parts: &[MmsPart]) -> ModemResult<Vec<u8>> {
    let transaction_id = headers
        .get("Transaction-Id")
        .ok_or_else(|| ModemError::InvalidData("m-send-req without Transaction-Id".to_string()))?;
    if !headers.contains_key("To") {
        return Err(ModemError::InvalidData("m-send-req without To".to_string()));
    }

    let mut out = vec![0x80 | MESSAGE_TYPE, M_SEND_REQ, 0x80 | TRANSACTION_ID];
    push_text(&mut out, transaction_id);
    out.extend([0x80 | MMS_VERSION, VERSION_1_0, 0x80 | FROM, 0x01, INSERT_ADDRESS]);

    for (field, name) in [(TO, "To"), (CC, "Cc"), (BCC, "Bcc")] {
        let Some(recipients) = headers.get(name) else {
            continue;
        };
        for recipient in recipients.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            out.push(0x80 | field);
            push_text(&mut out, recipient);
        }
    }
    if let Some(subject) = headers.get("Subject") {
        out.push(0x80 | SUBJECT);
        push_text(&mut out, subject);
    }
    if let Some(class) = headers.get("Message-Class") {
        out.push(0x80 | MESSAGE_CLASS);
        match class.as_str() {
            "Personal" => out.push(0x80),
            "Advertisement" => out.push(0x81),
            "Informational" => out.push(0x82),
            "Auto" => out.push(0x83),
            other => push_text(&mut out, other),
        }
    }
    if let Some(priority) = headers.get("Priority") {
        let value = match priority.as_str() {
            "Low" => 0x80,
            "High" => 0x82,
            _ => 0x81,
        };
        out.extend([0x80 | PRIORITY, value]);
    }
    for (field, name) in [(DELIVERY_REPORT, "Delivery-Report"), (READ_REPLY, "Read-Reply")] {
        if let Some(flag) = headers.get(name) {
            out.extend([0x80 | field, if flag == "Yes" { 0x80 } else { 0x81 }]);
        }
    }

    let content_type = headers
        .get("Content-Type")
        .map(String::as_str)
        .unwrap_or(MULTIPART_MIXED);
    out.push(0x80 | CONTENT_TYPE);
    push_content_type(&mut out, content_type, &MmsHeaders::new());

    push_uintvar(&mut out, parts.len() as u32);
    for part in parts {
        let mut part_headers = Vec::new();
        push_content_type(&mut part_headers, &part.content_type, &part.parameters);
        push_uintvar(&mut out, part_headers.len() as u32);
        push_uintvar(&mut out, part.data.len() as u32);
        out.extend(part_headers);
        out.extend(&part.data);
    }
    Ok(out)
}

/// Encode the m-notifyresp-ind telling the MMSC the message was retrieved.
pub fn encode_notifyresp_ind(transaction_id: &str) -> Vec<u8> {
    let mut out = vec![0x80 | MESSAGE_TYPE, M_NOTIFYRESP_IND, 0x80 | TRANSACTION_ID];
    out.extend(transaction_id.as_bytes());
    out.push(0x00);
    out.extend([0x80 | MMS_VERSION, VERSION_1_0, 0x80 | STATUS, STATUS_RETRIEVED]);
    out
}

fn token(r: &mut Cursor<'_>, name: &str) -> ModemResult<String> {
    r.u8()?;
    Ok(name.to_string())
}

fn field_name(field: u8) -> &'static str {
    match field {
        0x01 => "Bcc",
        0x02 => "Cc",
        0x03 => "Content-Location",
        0x04 => "Content-Type",
        0x05 => "Date",
        0x06 => "Delivery-Report",
        0x07 => "Delivery-Time",
        0x08 => "Expiry",
        0x09 => "From",
        0x0A => "Message-Class",
        0x0B => "Message-ID",
        0x0C => "Message-Type",
        0x0D => "MMS-Version",
        0x0E => "Message-Size",
        0x0F => "Priority",
        0x10 => "Read-Reply",
        0x11 => "Report-Allowed",
        0x12 => "Response-Status",
        0x13 => "Response-Text",
        0x14 => "Sender-Visibility",
        0x15 => "Status",
        0x16 => "Subject",
        0x17 => "To",
        0x18 => "Transaction-Id",
        _ => "Unknown",
    }
}

fn message_type_name(value: u8) -> String {
    match value {
        0x80 => "m-send-req",
        0x81 => "m-send-conf",
        0x82 => "m-notification-ind",
        0x83 => "m-notifyresp-ind",
        0x84 => "m-retrieve-conf",
        0x85 => "m-acknowledge-ind",
        0x86 => "m-delivery-ind",
        _ => "unknown",
    }
    .to_string()
}

fn status_name(value: u8) -> String {
    match value {
        0x80 => "Expired",
        0x81 => "Retrieved",
        0x82 => "Rejected",
        0x83 => "Deferred",
        0x84 => "Unrecognised",
        _ => "Unknown",
    }
    .to_string()
}

fn well_known_content_type(value: u8) -> String {
    CONTENT_TYPES
        .iter()
        .find(|(code, _)| *code == value)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("application/x-wap-{:02x}", value))
}

fn charset_name(mib: u64) -> String {
    CHARSETS
        .iter()
        .find(|(code, _)| *code as u64 == mib)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| mib.to_string())
}

fn push_uintvar(out: &mut Vec<u8>, mut value: u32) {
    let mut septets = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        septets.push(0x80 | (value & 0x7F) as u8);
        value >>= 7;
    }
    out.extend(septets.iter().rev());
}

fn push_value_length(out: &mut Vec<u8>, len: usize) {
    if len <= 30 {
        out.push(len as u8);
    } else {
        out.push(31);
        push_uintvar(out, len as u32);
    }
}

fn push_text(out: &mut Vec<u8>, text: &str) {
    if text.as_bytes().first().is_some_and(|b| *b >= 0x80) {
        out.push(QUOTE);
    }
    out.extend(text.as_bytes());
    out.push(0x00);
}

fn push_media(out: &mut Vec<u8>, media: &str) {
    match CONTENT_TYPES.iter().find(|(_, name)| name.eq_ignore_ascii_case(media)) {
        Some((code, _)) => out.push(0x80 | code),
        None => push_text(out, media),
    }
}

fn push_content_type(out: &mut Vec<u8>, media: &str, parameters: &MmsHeaders) {
    if parameters.is_empty() {
        push_media(out, media);
        return;
    }
    let mut value = Vec::new();
    push_media(&mut value, media);
    for (name, param) in parameters {
        let well_known = PARAMETERS.iter().find(|(_, n)| n.eq_ignore_ascii_case(name));
        match well_known {
            Some((code, "Charset")) => {
                value.push(0x80 | code);
                match CHARSETS.iter().find(|(_, n)| n.eq_ignore_ascii_case(param)) {
                    Some((mib, _)) if *mib < 0x80 => value.push(0x80 | *mib as u8),
                    Some((mib, _)) => value.extend([0x02, (mib >> 8) as u8, *mib as u8]),
                    None => push_text(&mut value, param),
                }
            }
            Some((code, _)) => {
                value.push(0x80 | code);
                push_text(&mut value, param);
            }
            None => {
                push_text(&mut value, name);
                push_text(&mut value, param);
            }
        }
    }
    push_value_length(out, value.len());
    out.extend(value);
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> ModemResult<u8> {
        self.data.get(self.pos).copied().ok_or_else(truncated)
    }

    fn u8(&mut self) -> ModemResult<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> ModemResult<&'a [u8]> {
        let out = self.data.get(self.pos..self.pos + len).ok_or_else(truncated)?;
        self.pos += len;
        Ok(out)
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = self.data.get(self.pos..).unwrap_or(&[]);
        self.pos = self.data.len();
        out
    }

    fn uintvar(&mut self) -> ModemResult<u32> {
        let mut value = 0u32;
        for _ in 0..5 {
            let byte = self.u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ModemError::InvalidData("uintvar too long".to_string()))
    }

    fn value_length(&mut self) -> ModemResult<usize> {
        match self.u8()? {
            len @ 0..=30 => Ok(len as usize),
            31 => Ok(self.uintvar()? as usize),
            other => Err(ModemError::InvalidData(format!("bad value length {:02x}", other))),
        }
    }

    fn text(&mut self) -> ModemResult<String> {
        if self.peek()? == 0x7F {
            self.pos += 1;
        }
        let start = self.pos;
        let end = self.data[start..]
            .iter()
            .position(|b| *b == 0)
            .map(|p| start + p)
            .ok_or_else(truncated)?;
        self.pos = end + 1;
        Ok(String::from_utf8_lossy(&self.data[start..end]).into_owned())
    }

    fn long_integer(&mut self) -> ModemResult<u64> {
        let len = self.u8()? as usize;
        if len > 8 {
            return Err(ModemError::InvalidData(format!("long integer of {} octets", len)));
        }
        Ok(self.take(len)?.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    fn encoded_string(&mut self) -> ModemResult<String> {
        if self.peek()? < 0x20 {
            let len = self.value_length()?;
            let mut inner = Cursor::new(self.take(len)?);
            let charset = inner.u8()?;
            if charset & 0x80 == 0 {
                // long-integer charset
                inner.pos -= 1;
                inner.long_integer()?;
            }
            return inner.text();
        }
        self.text()
    }

    fn content_type(&mut self) -> ModemResult<String> {
        Ok(self.content_type_with_params()?.0)
    }

    fn content_type_with_params(&mut self) -> ModemResult<(String, MmsHeaders)> {
        match self.peek()? {
            0x80.. => Ok((well_known_content_type(self.u8()? & 0x7F), MmsHeaders::new())),
            0..=0x1F => {
                let len = self.value_length()?;
                let mut inner = Cursor::new(self.take(len)?);
                let media = match inner.peek()? {
                    0x80.. => well_known_content_type(inner.u8()? & 0x7F),
                    0..=0x1E => well_known_content_type(inner.long_integer()? as u8),
                    _ => inner.text()?,
                };
                let mut parameters = MmsHeaders::new();
                while !inner.is_empty() {
                    let (name, value) = inner.parameter()?;
                    parameters.insert(name, value);
                }
                Ok((media, parameters))
            }
            _ => Ok((self.text()?, MmsHeaders::new())),
        }
    }

    fn parameter(&mut self) -> ModemResult<(String, String)> {
        if self.peek()? & 0x80 == 0 {
            let name = self.text()?;
            let value = self.text_value()?;
            return Ok((name, value));
        }
        let code = self.u8()? & 0x7F;
        let name = PARAMETERS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, n)| n.to_string())
            .unwrap_or_else(|| format!("{:02x}", code));
        let value = match code {
            0x01 => match self.peek()? {
                0x80.. => charset_name((self.u8()? & 0x7F) as u64),
                0..=0x1E => charset_name(self.long_integer()?),
                _ => self.text()?,
            },
            0x09 => match self.peek()? {
                0x80.. => well_known_content_type(self.u8()? & 0x7F),
                _ => self.text()?,
            },
            _ => self.generic_value()?,
        };
        Ok((name, value))
    }

    /// Text that may carry a leading `"` quote.
    fn text_value(&mut self) -> ModemResult<String> {
        if self.peek()? == b'"' {
            self.pos += 1;
        }
        self.text()
    }

    fn generic_value(&mut self) -> ModemResult<String> {
        match self.peek()? {
            0x80.. => Ok((self.u8()? & 0x7F).to_string()),
            0..=0x1F => {
                let len = self.value_length()?;
                Ok(crate::encoding::hex_encode(self.take(len)?))
            }
            _ => self.text_value(),
        }
    }
}

fn truncated() -> ModemError {
    ModemError::InvalidData("truncated WSP data".to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::notification_push;
    use super::*;

    #[test]
    fn test_extract_notification() {
        let push = notification_push("T123", "+34607123456/TYPE=PLMN", "http://mms.example/abc");
        assert!(is_wap_push(&push));

        let notification = extract_push_notification(&push).unwrap();
        assert_eq!(notification.transaction_id, "T123");
        assert_eq!(notification.content_type, "application/vnd.wap.mms-message");
        assert_eq!(notification.from(), "+34607123456/TYPE=PLMN");
        assert_eq!(notification.content_location(), Some("http://mms.example/abc"));
        assert_eq!(notification.headers["Message-Type"], "m-notification-ind");
        assert_eq!(notification.headers["MMS-Version"], "1.0");
        assert_eq!(notification.headers["Message-Class"], "Personal");
        assert_eq!(notification.headers["Message-Size"], "8000");
        assert_eq!(notification.headers["Expiry"], "259200");
    }

    #[test]
    fn test_exported_headers_use_push_content_type() {
        let push = notification_push("T1", "+3412", "http://x/");
        let headers = extract_push_notification(&push).unwrap().exported_headers();
        assert_eq!(headers["Content-Type"], "application/vnd.wap.mms-message");
        assert_eq!(headers["Transaction-Id"], "T1");
    }

    #[test]
    fn test_not_a_push() {
        assert!(!is_wap_push(b"hello"));
        assert!(extract_push_notification(b"hello").is_err());
    }

    #[test]
    fn test_notifyresp_encoding() {
        let encoded = encode_notifyresp_ind("T123");
        assert_eq!(
            encoded,
            vec![0x8C, 0x83, 0x98, b'T', b'1', b'2', b'3', 0x00, 0x8D, 0x90, 0x95, 0x81]
        );
        let (headers, _) = decode_mms_headers(&encoded).unwrap();
        assert_eq!(headers["Message-Type"], "m-notifyresp-ind");
        assert_eq!(headers["Status"], "Retrieved");
    }

    #[test]
    fn test_send_req_encoding() {
        let headers = MmsHeaders::from([
            ("Transaction-Id".to_string(), "T9".to_string()),
            ("To".to_string(), "+34600111222/TYPE=PLMN".to_string()),
            ("Subject".to_string(), "hi".to_string()),
        ]);
        let parts = [MmsPart::new("text/plain", b"hola".to_vec()).with_parameter("Charset", "utf-8")];
        let encoded = encode_send_req(&headers, &parts).unwrap();
        assert_eq!(&encoded[..8], &[0x8C, 0x80, 0x98, b'T', b'9', 0x00, 0x8D, 0x90]);
        assert_eq!(&encoded[8..11], &[0x89, 0x01, 0x81]);

        let (decoded, offset) = decode_mms_headers(&encoded).unwrap();
        assert_eq!(decoded["Message-Type"], "m-send-req");
        assert_eq!(decoded["Transaction-Id"], "T9");
        assert_eq!(decoded["To"], "+34600111222/TYPE=PLMN");
        assert_eq!(decoded["Subject"], "hi");
        assert_eq!(decoded["From"], "");
        assert_eq!(decoded["Content-Type"], MULTIPART_MIXED);

        let body = &encoded[offset..];
        // one entry, 4 octets of headers, 4 of data, then text/plain; charset=utf-8
        assert_eq!(&body[..7], &[0x01, 0x04, 0x04, 0x03, 0x83, 0x81, 0xEA]);
        let decoded_parts = decode_multipart(body).unwrap();
        assert_eq!(decoded_parts.len(), 1);
        assert_eq!(decoded_parts[0].content_type, "text/plain");
        assert_eq!(decoded_parts[0].parameters["Charset"], "utf-8");
        assert_eq!(decoded_parts[0].data, b"hola");
    }

    #[test]
    fn test_send_req_needs_recipient() {
        let headers = MmsHeaders::from([("Transaction-Id".to_string(), "T9".to_string())]);
        assert!(encode_send_req(&headers, &[]).is_err());
    }

    #[test]
    fn test_decode_multipart_with_named_parts() {
        // two entries: image/jpeg named "a.jpg", then plain text
        let mut body = vec![0x02];
        body.extend([0x09, 0x02, 0x08, 0x9E, 0x85, b'a', b'.', b'j', b'p', b'g', 0x00, 0xFF, 0xD8]);
        body.extend([0x01, 0x02, 0x83, b'o', b'k']);
        let parts = decode_multipart(&body).unwrap();
        assert_eq!(parts[0].content_type, "image/jpeg");
        assert_eq!(parts[0].parameters["Name"], "a.jpg");
        assert_eq!(parts[0].data, vec![0xFF, 0xD8]);
        assert_eq!(parts[1], MmsPart::new("text/plain", b"ok".to_vec()));
    }

    #[test]
    fn test_uintvar_encoding() {
        let mut out = Vec::new();
        push_uintvar(&mut out, 0x7F);
        push_uintvar(&mut out, 0x80);
        push_uintvar(&mut out, 300);
        assert_eq!(out, vec![0x7F, 0x81, 0x00, 0x82, 0x2C]);
        assert_eq!(Cursor::new(&out[1..3]).uintvar().unwrap(), 0x80);
    }

    #[test]
    fn test_body_offset_after_content_type() {
        let mut data = vec![0x8C, 0x84, 0x98, b'X', 0x00, 0x84, 0xA3];
        data.extend(b"BODY");
        let (headers, offset) = decode_mms_headers(&data).unwrap();
        assert_eq!(headers["Content-Type"], "application/vnd.wap.multipart.mixed");
        assert_eq!(&data[offset..], b"BODY");
    }
}
