// ABOUTME: MMS transfer over the operator's WAP 2.0 HTTP proxy: fetch, acknowledge and send messages
// ABOUTME: Speaks plain HTTP/1.0 over a TCP stream to the proxy named in the connection settings

use crate::datatypes::ErrorKind;
use crate::error::{ModemError, ModemResult};
use crate::pdu::{
    MmsNotification, MmsPart, decode_mms_headers, decode_multipart, encode_notifyresp_ind,
    encode_send_req,
};
use crate::signals::MmsHeaders;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MMS_CONTENT_TYPE: &str = "application/vnd.wap.mms-message";

/// Address type the MMSC expects on phone-number recipients.
const PLMN_SUFFIX: &str = "/TYPE=PLMN";

/// Connection settings a client passes along with MMS requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MmsSettings {
    /// `host:port` of the WAP 2.0 proxy
    pub wap2: String,
    /// URL of the MMS centre
    pub mmsc: Option<String>,
}

impl MmsSettings {
    pub fn from_extra(extra: &HashMap<String, String>) -> ModemResult<MmsSettings> {
        let wap2 = extra
            .get("wap2")
            .filter(|v| v.contains(':'))
            .cloned()
            .ok_or_else(|| ModemError::InvalidData("missing wap2 proxy host:port".to_string()))?;
        Ok(MmsSettings {
            wap2,
            mmsc: extra.get("mmsc").cloned(),
        })
    }
}

/// A downloaded MMS: decoded headers plus its data parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MmsMessage {
    pub headers: MmsHeaders,
    pub parts: Vec<MmsPart>,
}

impl MmsMessage {
    pub fn decode(data: &[u8]) -> ModemResult<MmsMessage> {
        let (mut headers, offset) = decode_mms_headers(data)?;
        // Dates are not forwarded to clients
        headers.remove("Date");
        let body = data.get(offset..).unwrap_or_default();
        let content_type = headers.get("Content-Type").map(String::as_str).unwrap_or("");
        let parts = if content_type.starts_with("application/vnd.wap.multipart") {
            decode_multipart(body)?
        } else if body.is_empty() {
            Vec::new()
        } else {
            vec![MmsPart::new(content_type, body.to_vec())]
        };
        Ok(MmsMessage { headers, parts })
    }
}

/// Fetch the MMS announced by `notification`.
pub async fn download(notification: &MmsNotification, settings: &MmsSettings) -> ModemResult<MmsMessage> {
    let url = notification.content_location().ok_or_else(|| {
        ModemError::new(ErrorKind::ExpiredNotification, "notification without Content-Location")
    })?;
    debug!(url, proxy = %settings.wap2, "downloading MMS");
    let request = format!("GET {} HTTP/1.0\r\n\r\n", url);
    let body = exchange(&settings.wap2, request.as_bytes()).await?;
    MmsMessage::decode(&body)
}

/// Tell the MMS centre that `transaction_id` was retrieved.
pub async fn acknowledge(transaction_id: &str, settings: &MmsSettings) -> ModemResult<()> {
    let mmsc = mmsc(settings)?;
    let payload = encode_notifyresp_ind(transaction_id);
    debug!(mmsc, transaction_id, "acknowledging MMS");
    exchange(&settings.wap2, &post_request(mmsc, &payload)).await?;
    Ok(())
}

/// Submit an m-send-req and return the Message-ID the MMS centre assigned.
///
/// Phone-number recipients get the `/TYPE=PLMN` suffix and a missing
/// `Transaction-Id` is generated.
pub async fn send(
    mut headers: MmsHeaders,
    parts: &[MmsPart],
    settings: &MmsSettings,
) -> ModemResult<String> {
    let mmsc = mmsc(settings)?;
    let to = headers
        .get("To")
        .ok_or_else(|| ModemError::InvalidData("MMS without a recipient in To".to_string()))?;
    let to = plmn_recipients(to);
    headers.insert("To".to_string(), to);
    headers
        .entry("Transaction-Id".to_string())
        .or_insert_with(|| format!("{:x}", chrono::Utc::now().timestamp_millis()));

    let payload = encode_send_req(&headers, parts)?;
    debug!(mmsc, parts = parts.len(), size = payload.len(), "sending MMS");
    let reply = exchange(&settings.wap2, &post_request(mmsc, &payload)).await?;
    let (conf, _) = decode_mms_headers(&reply)?;
    // Response-Status 0x80 (Ok) decodes as "0"
    if let Some(status) = conf.get("Response-Status").filter(|status| *status != "0") {
        return Err(ModemError::new(
            ErrorKind::GenericError,
            format!("MMS centre refused the message with status {}", status),
        ));
    }
    conf.get("Message-ID")
        .cloned()
        .ok_or_else(|| ModemError::InvalidData("m-send-conf without Message-ID".to_string()))
}

fn plmn_recipients(to: &str) -> String {
    to.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            if r.contains('@') || r.ends_with(PLMN_SUFFIX) {
                r.to_string()
            } else {
                format!("{}{}", r, PLMN_SUFFIX)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn mmsc(settings: &MmsSettings) -> ModemResult<&str> {
    settings
        .mmsc
        .as_deref()
        .ok_or_else(|| ModemError::InvalidData("missing mmsc".to_string()))
}

fn post_request(url: &str, payload: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST {} HTTP/1.0\r\nContent-type: {}\r\nContent-Length: {}\r\n\r\n",
        url,
        MMS_CONTENT_TYPE,
        payload.len()
    )
    .into_bytes();
    request.extend_from_slice(payload);
    request
}

/// Send `request` to `proxy` and return the response body.
async fn exchange(proxy: &str, request: &[u8]) -> ModemResult<Vec<u8>> {
    let mut stream = TcpStream::connect(proxy).await?;
    stream.write_all(request).await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    response_body(&response)
}

fn response_body(response: &[u8]) -> ModemResult<Vec<u8>> {
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| ModemError::InvalidData("HTTP response without body".to_string()))?;

    let status_line = String::from_utf8_lossy(&response[..split]);
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(0);
    if !(200..300).contains(&status) {
        return Err(ModemError::InvalidData(format!(
            "MMS proxy answered {}",
            status_line.lines().next().unwrap_or("")
        )));
    }
    Ok(response[split + 4..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{extract_push_notification, notification_push};
    use tokio::net::TcpListener;

    #[test]
    fn test_settings_need_proxy() {
        let mut extra = HashMap::new();
        assert!(MmsSettings::from_extra(&extra).is_err());
        extra.insert("wap2".to_string(), "10.0.0.1:8080".to_string());
        extra.insert("mmsc".to_string(), "http://mmsc/".to_string());
        let settings = MmsSettings::from_extra(&extra).unwrap();
        assert_eq!(settings.mmsc.as_deref(), Some("http://mmsc/"));
    }

    #[test]
    fn test_response_body() {
        let body = response_body(b"HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nhi").unwrap();
        assert_eq!(body, b"hi");
        assert!(response_body(b"HTTP/1.0 404 Not Found\r\n\r\n").is_err());
        assert!(response_body(b"garbage").is_err());
    }

    #[test]
    fn test_recipients_get_plmn_type() {
        assert_eq!(plmn_recipients("+34600"), "+34600/TYPE=PLMN");
        assert_eq!(
            plmn_recipients("+34600/TYPE=PLMN, a@b.example"),
            "+34600/TYPE=PLMN,a@b.example"
        );
    }

    #[test]
    fn test_single_part_message() {
        let mut data = vec![0x8C, 0x84, 0x98, b'X', 0x00, 0x84, 0x83];
        data.extend(b"hello");
        let mms = MmsMessage::decode(&data).unwrap();
        assert_eq!(mms.parts, vec![MmsPart::new("text/plain", b"hello".to_vec())]);
    }

    #[tokio::test]
    async fn test_send_posts_send_req() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = vec![0u8; 4096];
            // read until the announced body has arrived
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.ends_with(b"hola") {
                    break;
                }
            }
            // m-send-conf, Response-Status Ok, Message-ID "M1"
            let mut response = b"HTTP/1.0 200 OK\r\n\r\n".to_vec();
            response.extend([0x8C, 0x81, 0x98, b'T', b'7', 0x00, 0x8D, 0x90, 0x92, 0x80]);
            response.extend([0x8B, b'M', b'1', 0x00]);
            socket.write_all(&response).await.unwrap();
            request
        });

        let headers = MmsHeaders::from([
            ("To".to_string(), "+34600111222".to_string()),
            ("Transaction-Id".to_string(), "T7".to_string()),
        ]);
        let parts = [MmsPart::new("text/plain", b"hola".to_vec())];
        let settings = MmsSettings {
            wap2: proxy,
            mmsc: Some("http://mmsc.example/".to_string()),
        };
        let message_id = send(headers, &parts, &settings).await.unwrap();
        assert_eq!(message_id, "M1");

        let request = server.await.unwrap();
        let split = request.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let head = String::from_utf8_lossy(&request[..split]);
        assert!(head.starts_with("POST http://mmsc.example/ HTTP/1.0"));
        let (sent, _) = decode_mms_headers(&request[split + 4..]).unwrap();
        assert_eq!(sent["Message-Type"], "m-send-req");
        assert_eq!(sent["To"], "+34600111222/TYPE=PLMN");
        assert_eq!(sent["Transaction-Id"], "T7");
    }

    #[tokio::test]
    async fn test_send_needs_recipient_and_mmsc() {
        let settings = MmsSettings {
            wap2: "127.0.0.1:9".to_string(),
            mmsc: None,
        };
        let headers = MmsHeaders::from([("To".to_string(), "+34600".to_string())]);
        assert!(send(headers, &[], &settings).await.is_err());

        let settings = MmsSettings {
            mmsc: Some("http://mmsc/".to_string()),
            ..settings
        };
        assert!(send(MmsHeaders::new(), &[], &settings).await.is_err());
    }

    #[test]
    fn test_post_request_layout() {
        let request = post_request("http://mmsc/", &[0x8C, 0x83]);
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST http://mmsc/ HTTP/1.0\r\n"));
        assert!(text.contains("Content-Length: 2\r\n\r\n"));
        assert!(request.ends_with(&[0x8C, 0x83]));
    }

    #[tokio::test]
    async fn test_download_through_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let mut response = b"HTTP/1.0 200 OK\r\n\r\n".to_vec();
            response.extend([0x8C, 0x84, 0x98, b'T', b'1', 0x00, 0x84, 0xA3]);
            // one text/plain entry: "PARTS"
            response.extend([0x01, 0x01, 0x05, 0x83]);
            response.extend(b"PARTS");
            socket.write_all(&response).await.unwrap();
            request
        });

        let push = notification_push("T1", "+3460/TYPE=PLMN", "http://mmsc.example/m1");
        let notification = extract_push_notification(&push).unwrap();
        let settings = MmsSettings {
            wap2: proxy,
            mmsc: None,
        };
        let mms = download(&notification, &settings).await.unwrap();
        assert_eq!(mms.headers["Message-Type"], "m-retrieve-conf");
        assert_eq!(mms.parts, vec![MmsPart::new("text/plain", b"PARTS".to_vec())]);

        let request = server.await.unwrap();
        assert_eq!(request, "GET http://mmsc.example/m1 HTTP/1.0\r\n\r\n");
    }
}
