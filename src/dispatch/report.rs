use std::error::Error;

use crate::domain::{RecipientEmail, RecipientId};
use crate::helpers::error_chain_fmt;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    QuotaExhausted,
    NoPendingRecipients,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FailedDelivery {
    pub email: RecipientEmail,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub daily_limit: u32,
    pub sent_this_cycle: u32,
    pub sent_today: u32,
    /// Not known when the quota was already exhausted: that path never
    /// touches the recipient store.
    pub remaining_pending: Option<u64>,
    pub failures: Vec<FailedDelivery>,
}

#[derive(thiserror::Error)]
pub enum DeliveryError {
    #[error("The transport failed to deliver the message.")]
    Transport(#[source] anyhow::Error),
    #[error("The recipient disappeared before it could be marked as sent.")]
    Vanished(#[source] StoreError),
}

impl std::fmt::Debug for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// The result of handing one recipient to the transport.
#[derive(Debug)]
pub struct DeliveryAttempt {
    pub recipient_id: RecipientId,
    pub email: RecipientEmail,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryAttempt {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure(&self) -> Option<FailedDelivery> {
        self.result.as_ref().err().map(|e| FailedDelivery {
            email: self.email.clone(),
            reason: cause_chain(e),
        })
    }
}

fn cause_chain(e: &DeliveryError) -> String {
    let mut message = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.source();
    }
    message
}

#[derive(thiserror::Error)]
pub enum DispatchError {
    #[error("A dispatch cycle is already running.")]
    CycleInProgress,
    #[error("The store became unavailable after {sent_this_cycle} successful sends in this cycle.")]
    Storage {
        sent_this_cycle: u32,
        #[source]
        source: StoreError,
    },
}

impl DispatchError {
    pub fn sent_this_cycle(&self) -> u32 {
        match self {
            DispatchError::CycleInProgress => 0,
            DispatchError::Storage {
                sent_this_cycle, ..
            } => *sent_this_cycle,
        }
    }
}

impl std::fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
