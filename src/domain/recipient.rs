use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::RecipientEmail;

pub type RecipientId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientState {
    Pending,
    Sent,
}

impl RecipientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientState::Pending => "pending",
            RecipientState::Sent => "sent",
        }
    }
}

/// A stored recipient. The state is derived from `sent_at`, so a record
/// can never be `Sent` without a timestamp or carry one while `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    id: RecipientId,
    email: RecipientEmail,
    sent_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn pending(id: RecipientId, email: RecipientEmail) -> Self {
        Self {
            id,
            email,
            sent_at: None,
        }
    }

    pub fn restore(id: RecipientId, email: RecipientEmail, sent_at: Option<DateTime<Utc>>) -> Self {
        Self { id, email, sent_at }
    }

    pub fn id(&self) -> RecipientId {
        self.id
    }

    pub fn email(&self) -> &RecipientEmail {
        &self.email
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn state(&self) -> RecipientState {
        match self.sent_at {
            Some(_) => RecipientState::Sent,
            None => RecipientState::Pending,
        }
    }

    /// Transitions Pending -> Sent. Returns `false` if the recipient was
    /// already sent, leaving the original timestamp untouched.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> bool {
        if self.sent_at.is_some() {
            return false;
        }
        self.sent_at = Some(at);
        true
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RecipientView {
    pub id: RecipientId,
    pub email: RecipientEmail,
    pub state: RecipientState,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<Recipient> for RecipientView {
    fn from(recipient: Recipient) -> Self {
        Self {
            id: recipient.id,
            state: recipient.state(),
            sent_at: recipient.sent_at,
            email: recipient.email,
        }
    }
}
