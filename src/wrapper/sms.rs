// ABOUTME: SMS and MMS operations: SIM reads and writes plus the message layer sitting on top of them
// ABOUTME: Logical indexes come from the message layer; on-SIM slots never leave this module

use super::{Wrapper, next_reference};
use crate::datatypes::{Charset, ErrorKind};
use crate::encoding::{check_if_ucs2, encode_text, unpack_ucs2_bytes};
use crate::error::{ModemError, ModemResult};
use crate::mms::{self, MmsMessage, MmsSettings};
use crate::pdu::MmsPart;
use crate::protocol::AtCommand;
use crate::signals::MmsHeaders;
use crate::sms::Message;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Store that `+CMTI` names for the SIM itself.
const SIM_STORE: &str = "SM";

impl Wrapper {
    /// Read every message stored on the SIM.
    pub async fn do_list_sms(&self) -> ModemResult<Vec<Message>> {
        let reply = match self.query("AT+CMGL=4", "list_sms").await {
            Ok(reply) => reply,
            Err(e) if e.is(ErrorKind::NotFound) || e.is(ErrorKind::GenericError) => {
                debug!(error = %e, "no stored messages");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut messages = Vec::with_capacity(reply.matches.len());
        for caps in &reply.matches {
            let index = caps.parse("id")?;
            let storage_status = caps.parse("where").ok();
            match Message::from_pdu(caps.str("pdu"), Some(index), storage_status) {
                Ok(sms) => messages.push(sms),
                Err(e) => warn!(index, error = %e, "skipping malformed PDU"),
            }
        }
        Ok(messages)
    }

    /// Read the message at `index` of `storage`. `None` when the slot is
    /// empty, which happens with spurious `+CMTI` notifications.
    pub async fn do_get_sms(&self, storage: &str, index: u32) -> ModemResult<Option<Message>> {
        let other_store = storage != SIM_STORE;
        if other_store {
            self.query(format!("AT+CPMS=\"{}\"", storage), "set_storage")
                .await?;
        }
        let result = self
            .query(format!("AT+CMGR={}", index), "get_sms")
            .await;
        if other_store {
            if let Err(e) = self
                .query(format!("AT+CPMS=\"{}\"", SIM_STORE), "set_storage")
                .await
            {
                warn!(error = %e, "could not switch back to SIM storage");
            }
        }

        let reply = result?;
        let Some(caps) = reply.matches.first() else {
            warn!(storage, index, "no message at notified slot");
            return Ok(None);
        };
        let sms = Message::from_pdu(caps.str("pdu"), Some(index), caps.parse("where").ok())?;
        Ok(Some(sms))
    }

    pub async fn do_delete_sms(&self, index: u32) -> ModemResult<()> {
        self.query(format!("AT+CMGD={}", index), "delete_sms")
            .await
            .map(|_| ())
    }

    /// Complete messages in the cache.
    pub async fn list_sms(&self) -> Vec<Message> {
        self.mal.lock().await.list().into_iter().cloned().collect()
    }

    pub async fn get_sms(&self, index: u32) -> ModemResult<Message> {
        self.mal.lock().await.get(index).cloned()
    }

    /// Delete a message and every SIM slot holding one of its fragments.
    pub async fn delete_sms(&self, index: u32) -> ModemResult<()> {
        let mut mal = self.mal.lock().await;
        let slots = mal.get(index)?.real_indexes.clone();
        for slot in &slots {
            self.do_delete_sms(*slot).await?;
        }
        mal.remove(index)?;
        debug!(index, ?slots, "SMS deleted");
        Ok(())
    }

    /// Write `sms` to the SIM. Returns its logical index.
    pub async fn save_sms(&self, sms: Message) -> ModemResult<u32> {
        let reference = next_reference(&self.sms_reference);
        let mut slots = Vec::new();
        for part in sms.to_pdus(reference, true)? {
            let cmd = AtCommand::new(format!("AT+CMGW={}", part.length), "save_sms")
                .with_eol("\r")
                .with_splitcmd(format!("{}\x1a", part.pdu));
            let reply = self.send(cmd).await?;
            slots.push(reply.first()?.parse("index")?);
        }
        let index = self.mal.lock().await.add_saved(sms, slots);
        debug!(index, "SMS saved");
        Ok(index)
    }

    /// Send `sms`, one `+CMGS` per part. With a status request only the
    /// reference the `Delivered` signal will carry is returned, otherwise
    /// the references of every part.
    pub async fn send_sms(&self, sms: Message) -> ModemResult<Vec<u32>> {
        let reference = next_reference(&self.sms_reference);
        let mut references = Vec::new();
        for part in sms.to_pdus(reference, false)? {
            let cmd = AtCommand::new(format!("AT+CMGS={}", part.length), "send_sms")
                .with_eol("\r")
                .with_splitcmd(format!("{}\x1a", part.pdu));
            let reply = self.send(cmd).await?;
            references.push(reply.first()?.parse("index")?);
        }
        info!(number = %sms.number, parts = references.len(), "SMS sent");

        if !sms.status_request {
            return Ok(references);
        }
        let tracked = self.mal.lock().await.track_sent(sms, &references);
        Ok(tracked.into_iter().collect())
    }

    /// Send the stored message at logical `index`, returning the
    /// references of its parts.
    pub async fn send_sms_from_storage(&self, index: u32) -> ModemResult<Vec<u32>> {
        let slots = self.mal.lock().await.get(index)?.real_indexes.clone();
        let mut references = Vec::with_capacity(slots.len());
        for slot in slots {
            let reply = self
                .query(format!("AT+CMSS={}", slot), "send_sms_from_storage")
                .await?;
            references.push(reply.first()?.parse("index")?);
        }
        Ok(references)
    }

    pub async fn get_smsc(&self) -> ModemResult<String> {
        let reply = self.query("AT+CSCA?", "get_smsc").await?;
        let smsc = reply
            .matches
            .first()
            .map(|caps| caps.str("smsc").to_string())
            .ok_or_else(|| ModemError::new(ErrorKind::NotFound, "no SMSC stored"))?;
        if !smsc.starts_with('+') && check_if_ucs2(&smsc) {
            return unpack_ucs2_bytes(&smsc);
        }
        Ok(smsc)
    }

    pub async fn set_smsc(&self, smsc: &str) -> ModemResult<()> {
        if let Some(hook) = self.custom.hooks().set_smsc {
            return hook(self, smsc.to_string()).await;
        }
        let lease = self.lease_charset().await;
        self.set_smsc_encoded(smsc, lease.charset()).await
    }

    /// `AT+CSCA` with `smsc` encoded in `charset`, which the caller keeps
    /// active meanwhile.
    pub(crate) async fn set_smsc_encoded(&self, smsc: &str, charset: Charset) -> ModemResult<()> {
        let smsc = encode_text(smsc, charset);
        self.query(format!("AT+CSCA=\"{}\"", smsc), "set_smsc")
            .await
            .map(|_| ())
    }

    /// `0` for PDU mode, `1` for text mode.
    pub async fn get_sms_format(&self) -> ModemResult<u32> {
        let reply = self.query("AT+CMGF?", "get_sms_format").await?;
        reply.first()?.parse("format")
    }

    pub async fn set_sms_format(&self, format: u32) -> ModemResult<()> {
        self.query(format!("AT+CMGF={}", format), "set_sms_format")
            .await
            .map(|_| ())
    }

    /// Configure new message indications (`AT+CNMI`).
    pub async fn set_sms_indication(&self, mode: u32, mt: u32, bm: u32, ds: u32, bfr: u32) -> ModemResult<()> {
        let raw = format!("AT+CNMI={},{},{},{},{}", mode, mt, bm, ds, bfr);
        self.query(raw, "set_sms_indication").await.map(|_| ())
    }

    /// Pending MMS notifications: logical index and headers.
    pub async fn list_available_mms(&self) -> Vec<(u32, MmsHeaders)> {
        self.mal.lock().await.mms_notifications()
    }

    /// Fetch the MMS announced under logical `index`.
    pub async fn download_mms(&self, index: u32, extra: &HashMap<String, String>) -> ModemResult<MmsMessage> {
        let settings = MmsSettings::from_extra(extra)?;
        let notification = {
            let mal = self.mal.lock().await;
            mal.bundle(index)?
                .last_notification()
                .cloned()
                .ok_or_else(|| ModemError::new(ErrorKind::ExpiredNotification, "empty bundle"))?
        };
        mms::download(&notification, &settings).await
    }

    /// Send an MMS through the MMSC named in `extra`, returning the
    /// Message-ID it assigned.
    pub async fn send_mms(
        &self,
        headers: MmsHeaders,
        parts: Vec<MmsPart>,
        extra: &HashMap<String, String>,
    ) -> ModemResult<String> {
        let settings = MmsSettings::from_extra(extra)?;
        let message_id = mms::send(headers, &parts, &settings).await?;
        info!(%message_id, "MMS sent");
        Ok(message_id)
    }

    /// Confirm retrieval to the MMSC and drop every push of the bundle
    /// from the SIM.
    pub async fn acknowledge_mms(&self, index: u32, extra: &HashMap<String, String>) -> ModemResult<()> {
        let settings = MmsSettings::from_extra(extra)?;
        let transaction_id = self.mal.lock().await.bundle(index)?.transaction_id.clone();
        mms::acknowledge(&transaction_id, &settings).await?;

        let slots = self.mal.lock().await.remove_bundle(index)?;
        for slot in slots {
            if let Err(e) = self.do_delete_sms(slot).await {
                warn!(slot, error = %e, "could not delete acknowledged push");
            }
        }
        info!(index, transaction_id, "MMS acknowledged");
        Ok(())
    }

    /// A `+CMTI` arrived: read the message and feed it to the cache.
    pub(super) async fn on_sms_notification(&self, storage: &str, index: u32) -> ModemResult<()> {
        let Some(sms) = self.do_get_sms(storage, index).await? else {
            return Ok(());
        };
        let ingested = self.mal.lock().await.ingest(sms, true);
        debug!(?ingested.sms_index, ?ingested.mms_index, "new message");
        for signal in ingested.signals {
            self.emit(signal);
        }
        Ok(())
    }

    /// A `+CDS` status report arrived.
    pub(super) async fn on_delivery_report(&self, pdu: &str) -> ModemResult<()> {
        let report = Message::from_pdu(pdu, None, None)?;
        if let Some(signal) = self.mal.lock().await.on_delivery_report(&report) {
            self.emit(signal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::pdu::encode_deliver_fixture;
    use crate::signals::Signal;

    fn stored(text: &str) -> String {
        encode_deliver_fixture("+447700900123", "+447785016005", text, None, 0)
    }

    #[tokio::test]
    async fn test_list_sms_reads_sim() {
        let listing = format!(
            "\r\n+CMGL: 1,1,,23\r\n{}\r\n+CMGL: 2,0,,23\r\n{}\r\n\r\nOK\r\n",
            stored("first"),
            stored("second")
        );
        let (wrapper, _) = scripted(vec![("AT+CMGL=4", listing)]);
        let messages = wrapper.do_list_sms().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "first");
        assert_eq!(messages[1].real_indexes, vec![2]);
        assert_eq!(messages[1].storage_status, Some(0));
    }

    #[tokio::test]
    async fn test_empty_sim_listing() {
        let (wrapper, _) = scripted(vec![("AT+CMGL=4", "\r\nERROR\r\n".into())]);
        assert!(wrapper.do_list_sms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notification_from_other_store() {
        let read = format!("\r\n+CMGR: 0,,23\r\n{}\r\n\r\nOK\r\n", stored("hi"));
        let (wrapper, mut seen) = scripted(vec![("AT+CMGR=5", read)]);
        let mut rx = wrapper.board().subscribe();

        wrapper.on_sms_notification("ME", 5).await.unwrap();

        assert_eq!(
            drain(&mut seen),
            vec!["AT+CPMS=\"ME\"", "AT+CMGR=5", "AT+CPMS=\"SM\""]
        );
        assert_eq!(rx.try_recv().unwrap(), Signal::SmsReceived { index: 1, completed: true });
        assert_eq!(rx.try_recv().unwrap(), Signal::Completed(1));
        assert_eq!(wrapper.list_sms().await.len(), 1);
    }

    #[tokio::test]
    async fn test_spurious_notification_is_ignored() {
        let (wrapper, _) = scripted(vec![]);
        wrapper.on_sms_notification("SM", 9).await.unwrap();
        assert!(wrapper.list_sms().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_every_slot() {
        let (wrapper, mut seen) = scripted(vec![]);
        let index = wrapper
            .mal
            .lock()
            .await
            .add_saved(Message::new("+1", "x"), vec![4, 5]);
        wrapper.delete_sms(index).await.unwrap();
        assert_eq!(drain(&mut seen), vec!["AT+CMGD=4", "AT+CMGD=5"]);
        assert!(wrapper.get_sms(index).await.unwrap_err().is(ErrorKind::InvalidIndex));
    }

    #[tokio::test]
    async fn test_save_sms_uses_prompt() {
        let (wrapper, mut seen) = scripted(vec![
            ("AT+CMGW", "\r\n> ".into()),
            ("00", "\r\n+CMGW: 3\r\n\r\nOK\r\n".into()),
        ]);
        let index = wrapper.save_sms(Message::new("+34600", "hello")).await.unwrap();
        let saved = wrapper.get_sms(index).await.unwrap();
        assert_eq!(saved.real_indexes, vec![3]);
        let lines = drain(&mut seen);
        assert!(lines[0].starts_with("AT+CMGW="));
        assert!(lines[1].starts_with("00"));
    }

    #[tokio::test]
    async fn test_smsc_decoding() {
        let (wrapper, _) = scripted(vec![(
            "AT+CSCA?",
            "\r\n+CSCA: \"002B00330034003600300037003900300039003900340033\",145\r\n\r\nOK\r\n".into(),
        )]);
        assert_eq!(wrapper.get_smsc().await.unwrap(), "+34607909943");

        let (wrapper, _) = scripted(vec![(
            "AT+CSCA?",
            "\r\n+CSCA: \"+34607909943\",145\r\n\r\nOK\r\n".into(),
        )]);
        assert_eq!(wrapper.get_smsc().await.unwrap(), "+34607909943");
    }
}
