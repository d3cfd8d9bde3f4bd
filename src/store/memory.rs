use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{QuotaLedger, RecipientStore, StoreError};
use crate::domain::{NewRecipient, Recipient, RecipientId, RecipientState};

/// Process-local recipient store. Records keep insertion order.
#[derive(Default)]
pub struct InMemoryRecipientStore {
    recipients: RwLock<Vec<Recipient>>,
}

impl InMemoryRecipientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: RecipientId) -> Option<Recipient> {
        self.recipients
            .read()
            .await
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Drops a record outright, as if it had been removed by another process.
    pub async fn remove(&self, id: RecipientId) {
        self.recipients.write().await.retain(|r| r.id() != id);
    }
}

#[async_trait]
impl RecipientStore for InMemoryRecipientStore {
    async fn insert_many(&self, recipients: Vec<NewRecipient>) -> Result<u64, StoreError> {
        let mut stored = self.recipients.write().await;
        let mut known: HashSet<String> = stored
            .iter()
            .map(|r| r.email().as_ref().to_lowercase())
            .collect();

        let mut inserted = 0;
        for recipient in recipients {
            if known.insert(recipient.email.as_ref().to_lowercase()) {
                stored.push(Recipient::pending(Uuid::new_v4(), recipient.email));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn count_by_state(&self, state: RecipientState) -> Result<u64, StoreError> {
        let stored = self.recipients.read().await;
        Ok(stored.iter().filter(|r| r.state() == state).count() as u64)
    }

    async fn select_pending(&self, max_count: u32) -> Result<Vec<Recipient>, StoreError> {
        let stored = self.recipients.read().await;
        Ok(stored
            .iter()
            .filter(|r| r.state() == RecipientState::Pending)
            .take(max_count as usize)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: RecipientId, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut stored = self.recipients.write().await;
        let recipient = stored
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(StoreError::NotFound(id))?;
        recipient.mark_sent(sent_at);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Recipient>, StoreError> {
        Ok(self.recipients.read().await.clone())
    }
}

#[derive(Default)]
pub struct InMemoryQuotaLedger {
    days: RwLock<HashMap<NaiveDate, u32>>,
}

impl InMemoryQuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn current_count(&self, day: NaiveDate) -> Result<u32, StoreError> {
        Ok(self.days.read().await.get(&day).copied().unwrap_or(0))
    }

    async fn increment(&self, day: NaiveDate, by: u32) -> Result<(), StoreError> {
        let mut days = self.days.write().await;
        let count = days.entry(day).or_insert(0);
        *count = count.saturating_add(by);
        Ok(())
    }
}
