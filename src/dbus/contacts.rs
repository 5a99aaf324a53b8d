// ABOUTME: org.freedesktop.ModemManager.Modem.Gsm.Contacts: the SIM phonebook
// ABOUTME: Contacts travel as (index, name, number) triples

use super::DbusError;
use crate::wrapper::{Contact, Wrapper};
use std::sync::Arc;
use zbus::interface;

pub struct ContactsIface {
    wrapper: Arc<Wrapper>,
}

impl ContactsIface {
    pub fn new(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }
}

fn triple(contact: Contact) -> (u32, String, String) {
    (contact.index, contact.name, contact.number)
}

#[interface(name = "org.freedesktop.ModemManager.Modem.Gsm.Contacts")]
impl ContactsIface {
    /// Store a contact in the first free slot, returning the slot.
    async fn add(&self, name: String, number: String) -> Result<u32, DbusError> {
        Ok(self.wrapper.add_contact(&name, &number, None).await?)
    }

    async fn delete(&self, index: u32) -> Result<(), DbusError> {
        Ok(self.wrapper.delete_contact(index).await?)
    }

    async fn edit(&self, index: u32, name: String, number: String) -> Result<u32, DbusError> {
        Ok(self.wrapper.edit_contact(index, &name, &number).await?)
    }

    async fn find(&self, pattern: String) -> Result<Vec<(u32, String, String)>, DbusError> {
        let found = self.wrapper.find_contacts(&pattern).await?;
        Ok(found.into_iter().map(triple).collect())
    }

    async fn get(&self, index: u32) -> Result<(u32, String, String), DbusError> {
        Ok(triple(self.wrapper.get_contact(index).await?))
    }

    async fn list(&self) -> Result<Vec<(u32, String, String)>, DbusError> {
        let contacts = self.wrapper.list_contacts().await?;
        Ok(contacts.into_iter().map(triple).collect())
    }

    async fn get_count(&self) -> Result<u32, DbusError> {
        Ok(self.wrapper.get_contact_count().await?)
    }

    async fn get_phonebook_size(&self) -> Result<u32, DbusError> {
        Ok(self.wrapper.phonebook_size().await?)
    }
}
