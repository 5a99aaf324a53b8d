// ABOUTME: org.freedesktop.ModemManager.Modem.Gsm.SMS: stored and outgoing messages plus MMS download and sending
// ABOUTME: Messages are exchanged as a{sv} dictionaries keyed like number, text, index and smsc

use super::{DbusError, Dict, dict_bool, dict_str};
use crate::pdu::MmsPart;
use crate::signals::MmsHeaders;
use crate::sms::Message;
use crate::wrapper::Wrapper;
use std::collections::HashMap;
use std::sync::Arc;
use zbus::interface;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};

pub struct SmsIface {
    wrapper: Arc<Wrapper>,
}

impl SmsIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

pub(super) fn message_dict(sms: &Message) -> Dict {
    let mut dict = Dict::new();
    dict.insert("number".to_string(), Value::from(sms.number.clone()));
    dict.insert("text".to_string(), Value::from(sms.text()));
    if let Some(index) = sms.index {
        dict.insert("index".to_string(), Value::from(index));
    }
    if let Some(status) = sms.storage_status {
        dict.insert("where".to_string(), Value::from(status));
    }
    if let Some(timestamp) = sms.timestamp() {
        dict.insert("timestamp".to_string(), Value::from(timestamp));
    }
    if let Some(csca) = &sms.csca {
        dict.insert("smsc".to_string(), Value::from(csca.clone()));
    }
    if sms.status_request {
        dict.insert("status_request".to_string(), Value::from(true));
    }
    dict
}

/// Outgoing message from a client dictionary.
pub(super) fn message_from_dict(
    dict: &HashMap<String, OwnedValue>,
) -> Result<Message, DbusError> {
    let number = dict_str(dict, "number").ok_or_else(|| DbusError::input("no number given"))?;
    let text = dict_str(dict, "text").ok_or_else(|| DbusError::input("no text given"))?;
    Ok(Message::new(number, text)
        .with_csca(dict_str(dict, "smsc").map(str::to_string))
        .with_status_request(dict_bool(dict, "status_request").unwrap_or(false)))
}

/// An MMS data part on the bus: content type, its parameters and the data.
pub type PartTuple = (String, HashMap<String, String>, Vec<u8>);

fn part_tuple(part: MmsPart) -> PartTuple {
    (part.content_type, part.parameters.into_iter().collect(), part.data)
}

fn part_from_tuple((content_type, parameters, data): PartTuple) -> MmsPart {
    MmsPart {
        content_type,
        parameters: parameters.into_iter().collect(),
        data,
    }
}

fn headers_dict(headers: MmsHeaders) -> Dict {
    headers
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect()
}

#[interface(name = "org.freedesktop.ModemManager.Modem.Gsm.SMS")]
impl SmsIface {
    async fn list(&self) -> Vec<Dict> {
        self.wrapper.list_sms().await.iter().map(message_dict).collect()
    }

    async fn get(&self, index: u32) -> Result<Dict, DbusError> {
        Ok(message_dict(&self.wrapper.get_sms(index).await?))
    }

    async fn delete(&self, index: u32) -> Result<(), DbusError> {
        Ok(self.wrapper.delete_sms(index).await?)
    }

    /// Send a message, returning the references of its parts.
    async fn send(&self, sms: HashMap<String, OwnedValue>) -> Result<Vec<u32>, DbusError> {
        let sms = message_from_dict(&sms)?;
        Ok(self.wrapper.send_sms(sms).await?)
    }

    async fn send_from_storage(&self, index: u32) -> Result<Vec<u32>, DbusError> {
        Ok(self.wrapper.send_sms_from_storage(index).await?)
    }

    /// Store a message, returning its logical index.
    async fn save(&self, sms: HashMap<String, OwnedValue>) -> Result<Vec<u32>, DbusError> {
        let sms = message_from_dict(&sms)?;
        Ok(vec![self.wrapper.save_sms(sms).await?])
    }

    async fn set_indication(
        &self,
        mode: u32,
        mt: u32,
        bm: u32,
        ds: u32,
        bfr: u32,
    ) -> Result<(), DbusError> {
        Ok(self.wrapper.set_sms_indication(mode, mt, bm, ds, bfr).await?)
    }

    async fn get_smsc(&self) -> Result<String, DbusError> {
        Ok(self.wrapper.get_smsc().await?)
    }

    async fn set_smsc(&self, smsc: String) -> Result<(), DbusError> {
        Ok(self.wrapper.set_smsc(&smsc).await?)
    }

    async fn get_format(&self) -> Result<u32, DbusError> {
        Ok(self.wrapper.get_sms_format().await?)
    }

    async fn set_format(&self, format: u32) -> Result<(), DbusError> {
        Ok(self.wrapper.set_sms_format(format).await?)
    }

    /// MMS notifications not yet downloaded, with their headers.
    async fn list_available_mms(&self) -> Vec<(u32, Dict)> {
        self.wrapper
            .list_available_mms()
            .await
            .into_iter()
            .map(|(index, headers)| (index, headers_dict(headers)))
            .collect()
    }

    /// Fetch an MMS through the gateway given in `extra`; returns its
    /// headers and data parts.
    async fn download_mms(
        &self,
        index: u32,
        extra: HashMap<String, String>,
    ) -> Result<(Dict, Vec<PartTuple>), DbusError> {
        let mms = self.wrapper.download_mms(index, &extra).await?;
        let parts = mms.parts.into_iter().map(part_tuple).collect();
        Ok((headers_dict(mms.headers), parts))
    }

    /// Send an MMS through the MMSC given in `extra`, returning the
    /// Message-ID it assigned.
    async fn send_mms(
        &self,
        headers: HashMap<String, String>,
        parts: Vec<PartTuple>,
        extra: HashMap<String, String>,
    ) -> Result<String, DbusError> {
        let headers: MmsHeaders = headers.into_iter().collect();
        let parts = parts.into_iter().map(part_from_tuple).collect();
        Ok(self.wrapper.send_mms(headers, parts, &extra).await?)
    }

    async fn acknowledge_mms(
        &self,
        index: u32,
        extra: HashMap<String, String>,
    ) -> Result<(), DbusError> {
        Ok(self.wrapper.acknowledge_mms(index, &extra).await?)
    }

    #[zbus(signal)]
    pub async fn sms_received(
        emitter: &SignalEmitter<'_>,
        index: u32,
        completed: bool,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn completed(emitter: &SignalEmitter<'_>, index: u32, completed: bool) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn delivered(emitter: &SignalEmitter<'_>, reference: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn mms_received(
        emitter: &SignalEmitter<'_>,
        index: u32,
        headers: Dict,
    ) -> zbus::Result<()>;
}
