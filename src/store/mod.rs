//! Durable state the dispatch engine reads and reconciles: the recipient
//! records and the per-day counter of successful sends.

mod memory;
mod postgres;

pub use memory::{InMemoryQuotaLedger, InMemoryRecipientStore};
pub use postgres::{PostgresQuotaLedger, PostgresRecipientStore};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{NewRecipient, Recipient, RecipientId, RecipientState};
use crate::helpers::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Recipient {0} does not exist.")]
    NotFound(RecipientId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// Appends the recipients, silently skipping addresses already stored.
    /// Returns how many records were actually inserted.
    async fn insert_many(&self, recipients: Vec<NewRecipient>) -> Result<u64, StoreError>;

    async fn count_by_state(&self, state: RecipientState) -> Result<u64, StoreError>;

    /// Up to `max_count` pending recipients in insertion order. Never errors
    /// just because nothing is pending.
    async fn select_pending(&self, max_count: u32) -> Result<Vec<Recipient>, StoreError>;

    /// Idempotent: marking an already sent recipient is a no-op.
    async fn mark_sent(&self, id: RecipientId, sent_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<Vec<Recipient>, StoreError>;
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Successful sends attributed to `day`; zero when the day has no record.
    async fn current_count(&self, day: NaiveDate) -> Result<u32, StoreError>;

    /// Adds `by` to the day's count, creating the record if needed.
    async fn increment(&self, day: NaiveDate, by: u32) -> Result<(), StoreError>;
}
