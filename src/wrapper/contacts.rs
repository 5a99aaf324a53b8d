// ABOUTME: SIM phonebook operations: add, edit, delete, find and list contacts
// ABOUTME: Names travel in the active charset; new entries take the lowest free slot

use super::{Wrapper, lock};
use crate::datatypes::{Charset, ErrorKind};
use crate::encoding::{decode_text, encode_text, unpack_ucs2_ts31101};
use crate::error::{ModemError, ModemResult};
use crate::protocol::{Captures, Reply};
use crate::sim;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Type of number for international numbers.
const INTERNATIONAL: u32 = 145;
/// Type of number for everything else.
const NATIONAL: u32 = 129;

/// A phonebook entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub index: u32,
    pub name: String,
    pub number: String,
}

impl Contact {
    pub fn new(index: u32, name: impl Into<String>, number: impl Into<String>) -> Contact {
        Contact {
            index,
            name: name.into(),
            number: number.into(),
        }
    }
}

/// Lookups that find nothing come back as one of these errors.
fn is_empty_listing(e: &ModemError) -> bool {
    [
        ErrorKind::NotFound,
        ErrorKind::InvalidIndex,
        ErrorKind::General,
        ErrorKind::GenericError,
    ]
    .into_iter()
    .any(|kind| e.is(kind))
}

impl Wrapper {
    /// Store a contact, at `index` when given (overwriting what is there),
    /// otherwise at the lowest free slot. Returns the slot used.
    pub async fn add_contact(&self, name: &str, number: &str, index: Option<u32>) -> ModemResult<u32> {
        let index = match index {
            Some(index) => index,
            None => self.next_contact_id().await?,
        };
        self.write_contact(index, name, number).await?;
        Ok(index)
    }

    pub async fn edit_contact(&self, index: u32, name: &str, number: &str) -> ModemResult<u32> {
        self.write_contact(index, name, number).await?;
        Ok(index)
    }

    async fn write_contact(&self, index: u32, name: &str, number: &str) -> ModemResult<()> {
        let category = if number.starts_with('+') { INTERNATIONAL } else { NATIONAL };
        let lease = self.lease_charset().await;
        let name = encode_text(name, lease.charset());
        let raw = format!("AT+CPBW={},\"{}\",{},\"{}\"", index, number, category, name);
        self.query(raw, "add_contact").await?;
        debug!(index, "contact stored");
        Ok(())
    }

    pub async fn delete_contact(&self, index: u32) -> ModemResult<()> {
        self.query(format!("AT+CPBW={}", index), "delete_contact")
            .await
            .map(|_| ())
    }

    /// Contacts whose name starts with `pattern`.
    pub async fn find_contacts(&self, pattern: &str) -> ModemResult<Vec<Contact>> {
        let lease = self.lease_charset().await;
        let pattern = encode_text(pattern, lease.charset());
        match self
            .query(format!("AT+CPBF=\"{}\"", pattern), "find_contacts")
            .await
        {
            Ok(reply) => Ok(contacts(&reply, lease.charset())),
            Err(e) if is_empty_listing(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn get_contact(&self, index: u32) -> ModemResult<Contact> {
        let lease = self.lease_charset().await;
        let reply = self
            .query(format!("AT+CPBR={}", index), "get_contact")
            .await?;
        Ok(to_contact(reply.first()?, lease.charset()))
    }

    /// Every contact on the SIM. An empty phonebook is not an error.
    pub async fn list_contacts(&self) -> ModemResult<Vec<Contact>> {
        let size = self.phonebook_size().await?;
        let lease = self.lease_charset().await;
        match self
            .query(format!("AT+CPBR=1,{}", size), "list_contacts")
            .await
        {
            Ok(reply) => Ok(contacts(&reply, lease.charset())),
            Err(e) if is_empty_listing(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn get_used_contact_ids(&self) -> ModemResult<Vec<u32>> {
        let contacts = self.list_contacts().await?;
        Ok(contacts.into_iter().map(|c| c.index).collect())
    }

    pub async fn get_contact_count(&self) -> ModemResult<u32> {
        Ok(self.get_used_contact_ids().await?.len() as u32)
    }

    /// Phonebook size, asking the SIM (with retries) the first time.
    pub async fn phonebook_size(&self) -> ModemResult<u32> {
        if let Some(size) = lock(&self.sim).size.filter(|size| *size > 0) {
            return Ok(size);
        }
        let mut attempt = 0;
        loop {
            match self.get_phonebook_size().await {
                Ok(size) => return Ok(size),
                Err(e) if attempt + 1 < sim::RETRY_ATTEMPTS => {
                    attempt += 1;
                    debug!(attempt, error = %e, "phonebook size unavailable");
                    sleep(Duration::from_secs(sim::RETRY_TIMEOUT)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn next_contact_id(&self) -> ModemResult<u32> {
        let size = self.phonebook_size().await?;
        let used: BTreeSet<u32> = self.get_used_contact_ids().await?.into_iter().collect();
        (1..=size)
            .find(|id| !used.contains(id))
            .ok_or_else(|| ModemError::new(ErrorKind::MemoryFull, "phonebook is full"))
    }
}

fn to_contact(caps: &Captures, charset: Charset) -> Contact {
    Contact {
        index: caps.parse("id").unwrap_or_default(),
        name: decode_name(caps.str("name"), charset),
        number: caps.str("number").to_string(),
    }
}

fn contacts(reply: &Reply, charset: Charset) -> Vec<Contact> {
    reply.matches.iter().map(|m| to_contact(m, charset)).collect()
}

/// Names written by a handset may use the SIM's own UCS2 layouts, which
/// never have a multiple of four hex digits.
fn decode_name(raw: &str, charset: Charset) -> String {
    let sim_layout = ["80", "81", "82"].iter().any(|p| raw.starts_with(p));
    if charset == Charset::Ucs2 && sim_layout && raw.len() % 4 != 0 {
        match unpack_ucs2_ts31101(raw) {
            Ok(name) => return name,
            Err(e) => debug!(raw, error = %e, "not a SIM name layout"),
        }
    }
    decode_text(raw, charset)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    const LISTING: &str = "\r\n+CPBR: 1,\"+34600000001\",145,\"Ann\"\r\n+CPBR: 3,\"600000003\",129,\"Bob\"\r\n\r\nOK\r\n";

    #[tokio::test]
    async fn test_add_contact_takes_lowest_free_slot() {
        let (wrapper, mut seen) = scripted(vec![
            ("AT+CPBR=?", "\r\n+CPBR: (1-250),40,14\r\n\r\nOK\r\n".into()),
            ("AT+CPBR=1,250", LISTING.into()),
        ]);
        let index = wrapper.add_contact("Eve", "+44700", None).await.unwrap();
        assert_eq!(index, 2);
        let lines = drain(&mut seen);
        assert_eq!(lines.last().unwrap(), "AT+CPBW=2,\"+44700\",145,\"Eve\"");
    }

    #[tokio::test]
    async fn test_explicit_index_overwrites() {
        let (wrapper, mut seen) = scripted(vec![]);
        let index = wrapper.add_contact("Eve", "0700", Some(7)).await.unwrap();
        assert_eq!(index, 7);
        assert_eq!(drain(&mut seen), vec!["AT+CPBW=7,\"0700\",129,\"Eve\""]);
    }

    #[tokio::test]
    async fn test_ucs2_names() {
        let (wrapper, mut seen) = scripted(vec![(
            "AT+CPBF",
            "\r\n+CPBF: 4,\"123\",129,\"004A006F\"\r\n\r\nOK\r\n".into(),
        )]);
        lock(&wrapper.sim).charset = Charset::Ucs2;
        let found = wrapper.find_contacts("Jo").await.unwrap();
        assert_eq!(found, vec![Contact::new(4, "Jo", "123")]);
        assert_eq!(drain(&mut seen), vec!["AT+CPBF=\"004A006F\""]);
    }

    #[tokio::test]
    async fn test_non_latin_ucs2_names() {
        let (wrapper, mut seen) = scripted(vec![(
            "AT+CPBR=5",
            "\r\n+CPBR: 5,\"+79001234567\",145,\"0410043D043D0430\"\r\n\r\nOK\r\n".into(),
        )]);
        lock(&wrapper.sim).charset = Charset::Ucs2;
        let contact = wrapper.get_contact(5).await.unwrap();
        assert_eq!(contact, Contact::new(5, "Анна", "+79001234567"));

        wrapper.edit_contact(5, "Анна", "+79001234567").await.unwrap();
        let lines = drain(&mut seen);
        assert_eq!(lines.last().unwrap(), "AT+CPBW=5,\"+79001234567\",145,\"0410043D043D0430\"");
    }

    #[test]
    fn test_sim_layout_names() {
        assert_eq!(decode_name("80004100420043FFFF", Charset::Ucs2), "ABC");
        assert_eq!(decode_name("81020A4181", Charset::Ucs2), "A\u{0501}");
        // plain UCS2 that happens to start with 80
        assert_eq!(decode_name("80010041", Charset::Ucs2), "\u{8001}A");
        assert_eq!(decode_name("8102", Charset::Ira), "8102");
    }

    #[tokio::test]
    async fn test_empty_phonebook_lists_nothing() {
        let (wrapper, _) = scripted(vec![("AT+CPBR=1,", "\r\n+CME ERROR: 22\r\n".into())]);
        lock(&wrapper.sim).size = Some(100);
        assert!(wrapper.list_contacts().await.unwrap().is_empty());
        assert_eq!(wrapper.get_contact_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_phonebook() {
        let (wrapper, _) = scripted(vec![("AT+CPBR=1,", LISTING.into())]);
        lock(&wrapper.sim).size = Some(1);
        let err = wrapper.add_contact("Zed", "1", None).await.unwrap_err();
        assert!(err.is(ErrorKind::MemoryFull));
    }
}
