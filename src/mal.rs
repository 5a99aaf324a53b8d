// ABOUTME: Message assembly layer: logically indexed cache of SMS and WAP-push MMS notifications
// ABOUTME: Reassembles multipart SMS, groups notification retries and correlates delivery reports

use crate::datatypes::ErrorKind;
use crate::error::{ModemError, ModemResult};
use crate::pdu::{Alphabet, MmsNotification, extract_push_notification, is_wap_push};
use crate::signals::{MmsHeaders, Signal};
use crate::sms::Message;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Several on-SIM pushes announcing the same MMS.
#[derive(Clone, Debug)]
pub struct NotificationBundle {
    pub transaction_id: String,
    notifications: Vec<(Message, MmsNotification)>,
}

impl NotificationBundle {
    fn new(transaction_id: String) -> Self {
        NotificationBundle {
            transaction_id,
            notifications: Vec::new(),
        }
    }

    /// The notification carried by the most recent push.
    pub fn last_notification(&self) -> Option<&MmsNotification> {
        self.notifications
            .iter()
            .max_by_key(|(push, _)| push.datetime)
            .map(|(_, notification)| notification)
    }

    /// On-SIM slots of every push in the bundle.
    pub fn real_indexes(&self) -> Vec<u32> {
        let mut indexes: Vec<u32> = self
            .notifications
            .iter()
            .flat_map(|(push, _)| push.real_indexes.iter().copied())
            .collect();
        indexes.sort_unstable();
        indexes
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Outcome of ingesting one fragment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Ingested {
    /// Logical SMS index, `None` when the fragment became an MMS notification
    pub sms_index: Option<u32>,
    pub mms_index: Option<u32>,
    /// Signals to emit, empty during cache priming
    pub signals: Vec<Signal>,
}

/// In-memory message cache. It performs no I/O: callers read PDUs from
/// the modem, feed them in, and act on the indexes handed back.
#[derive(Debug, Default)]
pub struct MessageAssemblyLayer {
    last_sms_index: u32,
    last_wap_index: u32,
    sms_map: BTreeMap<u32, Message>,
    wap_map: BTreeMap<u32, NotificationBundle>,
    pending: Vec<Message>,
    cached: bool,
}

impl MessageAssemblyLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every cached message. Indexes keep counting up.
    pub fn reset(&mut self) {
        self.sms_map.clear();
        self.wap_map.clear();
        self.pending.clear();
        self.cached = false;
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Ingest the full SIM listing.
    pub fn prime(&mut self, messages: Vec<Message>) {
        for sms in messages {
            self.ingest(sms, false);
        }
        self.cached = true;
    }

    /// Add one fragment read from the SIM. `emit` is set for messages
    /// arriving while the device runs, not for the startup listing.
    pub fn ingest(&mut self, sms: Message, emit: bool) -> Ingested {
        let mut out = Ingested::default();

        if !sms.is_multipart() {
            let index = self.store(sms);
            if self.is_wap_push(index) {
                out.mms_index = self.process_wap_push(index, emit, &mut out.signals);
                return out;
            }
            debug!(index, "single part SMS added");
            if emit {
                out.signals.push(Signal::SmsReceived { index, completed: true });
                out.signals.push(Signal::Completed(index));
            }
            out.sms_index = Some(index);
            return out;
        }

        if !sms.has_valid_seq() {
            warn!(
                seq = sms.seq,
                cnt = sms.cnt,
                slots = ?sms.real_indexes,
                "dropping SMS fragment with an impossible sequence number"
            );
            return out;
        }

        let existing = self
            .sms_map
            .iter()
            .find(|(_, m)| m.accepts(&sms))
            .map(|(index, _)| *index);

        let Some(index) = existing else {
            let index = self.store(sms);
            debug!(index, "first fragment of a multipart SMS added");
            if emit {
                out.signals.push(Signal::SmsReceived { index, completed: false });
            }
            out.sms_index = Some(index);
            return out;
        };

        let completed = match self.sms_map.get_mut(&index) {
            Some(message) => message.append(sms),
            None => false,
        };
        debug!(index, completed, "fragment assembled");

        if completed && self.is_wap_push(index) {
            out.mms_index = self.process_wap_push(index, emit, &mut out.signals);
            return out;
        }
        if emit {
            out.signals.push(Signal::SmsReceived { index, completed });
            if completed {
                out.signals.push(Signal::Completed(index));
            }
        }
        out.sms_index = Some(index);
        out
    }

    fn store(&mut self, mut sms: Message) -> u32 {
        self.last_sms_index += 1;
        let index = self.last_sms_index;
        sms.index = Some(index);
        self.sms_map.insert(index, sms);
        index
    }

    fn is_wap_push(&self, index: u32) -> bool {
        self.sms_map
            .get(&index)
            .is_some_and(|m| m.completed && m.fmt == Alphabet::EightBit && is_wap_push(&m.data()))
    }

    fn process_wap_push(&mut self, index: u32, emit: bool, signals: &mut Vec<Signal>) -> Option<u32> {
        let push = self.sms_map.remove(&index)?;
        let notification = match extract_push_notification(&push.data()) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(index, error = %e, "dropping undecodable WAP push");
                return None;
            }
        };

        let existing = self.wap_map.iter().find_map(|(i, bundle)| {
            let same_sender = bundle
                .last_notification()
                .is_some_and(|last| last.from() == notification.from());
            (bundle.transaction_id == notification.transaction_id && same_sender).then_some(*i)
        });

        let (mms_index, created) = match existing {
            Some(i) => (i, false),
            None => {
                // MMS indexes start at 0, SMS indexes at 1; 0 is a real bundle
                let i = self.last_wap_index;
                self.last_wap_index += 1;
                (i, true)
            }
        };

        let bundle = self
            .wap_map
            .entry(mms_index)
            .or_insert_with(|| NotificationBundle::new(notification.transaction_id.clone()));
        bundle.notifications.push((push, notification));
        debug!(index = mms_index, pushes = bundle.len(), "WAP push notification stored");

        if emit && created {
            let headers = bundle
                .last_notification()
                .map(MmsNotification::exported_headers)
                .unwrap_or_default();
            signals.push(Signal::MmsReceived {
                index: mms_index,
                headers,
            });
        }
        Some(mms_index)
    }

    /// Complete messages, in logical index order.
    pub fn list(&self) -> Vec<&Message> {
        self.sms_map.values().filter(|m| m.completed).collect()
    }

    pub fn get(&self, index: u32) -> ModemResult<&Message> {
        self.sms_map.get(&index).ok_or_else(|| missing_sms(index))
    }

    /// Drop a message from the cache, returning it so its on-SIM slots
    /// can be deleted.
    pub fn remove(&mut self, index: u32) -> ModemResult<Message> {
        self.sms_map.remove(&index).ok_or_else(|| missing_sms(index))
    }

    /// Cache a message written to the SIM at `indexes`.
    pub fn add_saved(&mut self, mut sms: Message, indexes: Vec<u32>) -> u32 {
        sms.real_indexes = indexes;
        sms.completed = true;
        self.store(sms)
    }

    /// Remember the references of a sent message that asked for a status
    /// report. Returns the reference the `Delivered` signal will carry.
    pub fn track_sent(&mut self, mut sms: Message, references: &[u32]) -> Option<u32> {
        let first = *references.first()?;
        sms.status_references = references.to_vec();
        sms.status_reference = Some(first);
        self.pending.push(sms);
        Some(first)
    }

    /// Correlate a status report with the pending sent messages.
    pub fn on_delivery_report(&mut self, report: &Message) -> Option<Signal> {
        if !report.is_status_report() {
            warn!(number = %report.number, "delivery report is not a status report");
            return None;
        }
        let reference = report.report_reference?;

        let Some(pos) = self
            .pending
            .iter()
            .position(|sms| sms.status_references.contains(&reference))
        else {
            warn!(reference, "status report with unknown reference");
            return None;
        };

        let sms = &mut self.pending[pos];
        sms.status_references.retain(|r| *r != reference);
        if !sms.status_references.is_empty() {
            return None;
        }
        let sms = self.pending.remove(pos);
        sms.status_reference.map(Signal::Delivered)
    }

    /// Logical index and exported headers of every pending MMS.
    pub fn mms_notifications(&self) -> Vec<(u32, MmsHeaders)> {
        self.wap_map
            .iter()
            .filter_map(|(index, bundle)| {
                bundle
                    .last_notification()
                    .map(|n| (*index, n.exported_headers()))
            })
            .collect()
    }

    pub fn bundle(&self, index: u32) -> ModemResult<&NotificationBundle> {
        self.wap_map.get(&index).ok_or_else(|| expired(index))
    }

    /// Drop an acknowledged MMS, returning the on-SIM slots to delete.
    pub fn remove_bundle(&mut self, index: u32) -> ModemResult<Vec<u32>> {
        self.wap_map
            .remove(&index)
            .map(|bundle| bundle.real_indexes())
            .ok_or_else(|| expired(index))
    }
}

fn missing_sms(index: u32) -> ModemError {
    ModemError::new(
        ErrorKind::InvalidIndex,
        format!("SMS with logical index {} does not exist", index),
    )
}

fn expired(index: u32) -> ModemError {
    ModemError::new(
        ErrorKind::ExpiredNotification,
        format!("MMS notification {} does not exist", index),
    )
}
