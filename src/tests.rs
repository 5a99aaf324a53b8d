// ABOUTME: End-to-end scenarios driving an attached device through a scripted modem
// ABOUTME: Covers enabling with and without a PIN, incoming multipart SMS, delivery reports and plugin quirks

use crate::customizer::Family;
use crate::daemon::PollIntervals;
use crate::datatypes::{Charset, ErrorKind, Interface, ModemState};
use crate::device::Device;
use crate::pdu::{Concat, encode_deliver_fixture};
use crate::plugin::{Plugin, Registry};
use crate::port::PortPair;
use crate::signals::Signal;
use crate::sms::Message;
use crate::wrapper::testing::drain;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, mpsc};

/// Scripted modem that can also raise notifications on its own.
struct Modem {
    replies: Arc<Mutex<Vec<(String, String)>>>,
    pushes: mpsc::UnboundedSender<String>,
    seen: mpsc::UnboundedReceiver<String>,
}

impl Modem {
    fn start(script: Vec<(&str, String)>) -> (DuplexStream, Modem) {
        let (ours, mut port) = tokio::io::duplex(64 * 1024);
        let replies: Vec<(String, String)> = script
            .into_iter()
            .map(|(prefix, reply)| (prefix.to_string(), reply))
            .collect();
        let replies = Arc::new(Mutex::new(replies));
        let (pushes, mut pending) = mpsc::unbounded_channel::<String>();
        let (seen_tx, seen) = mpsc::unbounded_channel();

        let table = replies.clone();
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                tokio::select! {
                    read = port.read(&mut chunk) => {
                        let n = match read {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        buf.extend_from_slice(&chunk[..n]);
                        while let Some(pos) = buf.iter().position(|b| *b == b'\r' || *b == 0x1a) {
                            let line: Vec<u8> = buf.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&line[..line.len() - 1])
                                .trim_start_matches('\n')
                                .to_string();
                            if line.is_empty() {
                                continue;
                            }
                            let reply = table
                                .lock()
                                .unwrap()
                                .iter()
                                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                                .map(|(_, reply)| reply.clone())
                                .unwrap_or_else(|| "\r\nOK\r\n".to_string());
                            let _ = seen_tx.send(line);
                            if port.write_all(reply.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(text) = pending.recv() => {
                        if port.write_all(text.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        (
            ours,
            Modem {
                replies,
                pushes,
                seen,
            },
        )
    }

    /// Answer lines starting with `prefix` with `reply` from now on.
    fn answer(&self, prefix: &str, reply: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(0, (prefix.to_string(), reply.to_string()));
    }

    fn notify(&self, text: &str) {
        self.pushes.send(text.to_string()).unwrap();
    }

    fn lines(&mut self) -> Vec<String> {
        drain(&mut self.seen)
    }
}

/// Replies of a healthy SIM through a full enable.
fn enable_script(cpin: &str) -> Vec<(&'static str, String)> {
    vec![
        ("AT+CPIN?", format!("\r\n+CPIN: {}\r\n\r\nOK\r\n", cpin)),
        ("AT+CFUN?", "\r\n+CFUN: 1\r\n\r\nOK\r\n".into()),
        ("AT+CSCS=?", "\r\n+CSCS: (\"IRA\",\"GSM\",\"UCS2\")\r\n\r\nOK\r\n".into()),
        ("AT+CPBR=?", "\r\n+CPBR: (1-250),40,14\r\n\r\nOK\r\n".into()),
        ("AT+CMGL=4", "\r\nOK\r\n".into()),
        ("AT+CLCK", "\r\n+CLCK: 0\r\n\r\nOK\r\n".into()),
        ("AT+CGSN", "\r\n354784030089712\r\n\r\nOK\r\n".into()),
    ]
}

fn generic_device(stream: DuplexStream) -> Device {
    Device::attach(
        "/sys/devices/usb1/1-2",
        Plugin::new("Generic", Family::Generic),
        PortPair::single("/dev/ttyACM0"),
        stream,
        PollIntervals::default(),
    )
    .unwrap()
}

async fn wait_for(rx: &mut broadcast::Receiver<Signal>, wanted: Signal) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(signal) if signal == wanted => return,
                Ok(_) => {}
                Err(e) => panic!("signals closed: {}", e),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never saw {:?}", wanted));
}

fn stored_read(pdu: &str) -> String {
    format!("\r\n+CMGR: 0,,40\r\n{}\r\n\r\nOK\r\n", pdu)
}

#[tokio::test]
async fn test_enable_and_disable_device() {
    let (stream, mut modem) = Modem::start(enable_script("READY"));
    let device = generic_device(stream);
    let wrapper = device.wrapper().clone();
    let mut rx = device.board().subscribe();

    wrapper.enable_device().await.unwrap();

    assert_eq!(wrapper.status(), ModemState::Enabled);
    assert_eq!(wrapper.charset(), Charset::Ucs2);
    assert_eq!(wrapper.sim().size, Some(250));
    let board = device.board();
    let modem_props = board.properties(Interface::Modem);
    assert_eq!(modem_props["EquipmentIdentifier"].as_str(), Some("354784030089712"));
    assert_eq!(modem_props["UnlockRequired"].as_str(), Some(""));
    assert_eq!(modem_props["UnlockRetries"].as_u32(), Some(999));
    assert_eq!(
        board.property(Interface::Card, "PinEnabled").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        board.property(Interface::Ussd, "State").and_then(|v| v.as_str().map(str::to_string)),
        Some("idle".to_string())
    );

    let lines = modem.lines();
    for expected in ["AT+CMEE=1", "AT+CSCS=\"UCS2\"", "AT+CNMI=2,1,0,1,0", "AT+CMGF=0", "AT+CREG=1"] {
        assert!(lines.iter().any(|l| l == expected), "missing {}", expected);
    }
    wait_for(
        &mut rx,
        Signal::StateChanged {
            old: ModemState::Enabling,
            new: ModemState::Enabled,
        },
    )
    .await;

    wrapper.disable_device().await.unwrap();
    assert_eq!(wrapper.status(), ModemState::Disabled);
    device.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_pin_unlock_then_enable() {
    let (stream, mut modem) = Modem::start(enable_script("SIM PIN"));
    let device = generic_device(stream);
    let wrapper = device.wrapper().clone();

    let err = wrapper.enable_device().await.unwrap_err();
    assert!(err.is(ErrorKind::SimPinRequired));
    assert_eq!(wrapper.status(), ModemState::Disabled);
    assert_eq!(
        device
            .board()
            .property(Interface::Modem, "UnlockRequired")
            .and_then(|v| v.as_str().map(str::to_string)),
        Some("sim-pin".to_string())
    );

    modem.answer("AT+CPIN?", "\r\n+CPIN: READY\r\n\r\nOK\r\n");
    wrapper.send_pin("1234").await.unwrap();
    assert!(wrapper.authtime().is_some());
    wrapper.enable_device().await.unwrap();

    assert_eq!(wrapper.status(), ModemState::Enabled);
    assert!(modem.lines().iter().any(|l| l == "AT+CPIN=\"1234\""));
    device.close().await;
}

#[tokio::test]
async fn test_multipart_sms_arrives_in_pieces() {
    let part = |seq: u8, text: &str| {
        let concat = Concat {
            reference: 42,
            count: 2,
            seq,
        };
        stored_read(&encode_deliver_fixture(
            "+447700900123",
            "+447785016005",
            text,
            Some(concat),
            0,
        ))
    };
    let mut script = enable_script("READY");
    script.push(("AT+CMGR=1", part(1, "Hello from ")));
    script.push(("AT+CMGR=2", part(2, "space")));
    let (stream, modem) = Modem::start(script);
    let device = generic_device(stream);
    let wrapper = device.wrapper().clone();
    wrapper.enable_device().await.unwrap();
    let mut rx = device.board().subscribe();

    modem.notify("\r\n+CMTI: \"SM\",1\r\n");
    wait_for(&mut rx, Signal::SmsReceived { index: 1, completed: false }).await;
    assert!(wrapper.list_sms().await.is_empty());

    modem.notify("\r\n+CMTI: \"SM\",2\r\n");
    wait_for(&mut rx, Signal::SmsReceived { index: 1, completed: true }).await;
    wait_for(&mut rx, Signal::Completed(1)).await;

    let messages = wrapper.list_sms().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text(), "Hello from space");
    assert_eq!(messages[0].number, "+447700900123");
    assert_eq!(messages[0].real_indexes, vec![1, 2]);
    device.close().await;
}

#[tokio::test]
async fn test_delivery_report_for_sent_message() {
    let (stream, mut modem) = Modem::start(vec![
        ("AT+CMGS", "\r\n> ".into()),
        ("00", "\r\n+CMGS: 17\r\n\r\nOK\r\n".into()),
    ]);
    let device = generic_device(stream);
    let wrapper = device.wrapper().clone();
    let mut rx = device.board().subscribe();

    let sms = Message::new("+14155500010", "see you at eight").with_status_request(true);
    assert_eq!(wrapper.send_sms(sms).await.unwrap(), vec![17]);
    let lines = modem.lines();
    assert!(lines[0].starts_with("AT+CMGS="));

    // TP-MR 17 reported as delivered
    modem.notify("\r\n+CDS: 25\r\n0006110B914151550010F0902152810350409021528103514000\r\n");
    wait_for(&mut rx, Signal::Delivered(17)).await;
    device.close().await;
}

#[tokio::test]
async fn test_plugin_quirks_reach_the_device() {
    let plugin = Registry::builtin()
        .find_by_ids(0x12d1, 0x140c)
        .cloned()
        .unwrap();
    let (stream, mut modem) = Modem::start(vec![(
        "AT+CUSD=1",
        "\r\nOK\r\n\r\n+CUSD: 0,\"C2301B\",15\r\n".into(),
    )]);
    let device = Device::attach(
        "/sys/devices/usb1/1-3",
        plugin,
        PortPair::new(Some("/dev/ttyUSB0".into()), Some("/dev/ttyUSB1".into())),
        stream,
        PollIntervals::default(),
    )
    .unwrap();

    let text = device.wrapper().send_ussd("*100#").await.unwrap();
    assert_eq!(text, "Bal");
    assert_eq!(modem.lines(), vec!["AT+CUSD=1,\"AA180C3602\",15"]);
    assert_eq!(device.wrapper().custom().family(), "huawei");
    device.close().await;
}
