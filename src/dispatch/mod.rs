//! Quota-aware bulk dispatch.
//!
//! One cycle reads today's send count, selects at most the remaining
//! allowance of pending recipients, hands them to the transport one at a
//! time and reconciles the recipient store and the daily ledger afterwards.
//! A failed delivery never aborts the cycle; the recipient simply stays
//! pending for a later cycle.

mod clock;
mod report;

pub use clock::{Clock, FixedClock, SystemClock};
pub use report::{
    CycleOutcome, CycleReport, DeliveryAttempt, DeliveryError, DispatchError, FailedDelivery,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{OutgoingMessage, Recipient, RecipientEmail, RecipientState};
use crate::store::{QuotaLedger, RecipientStore, StoreError};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        recipient: &RecipientEmail,
        message: &OutgoingMessage,
    ) -> Result<(), anyhow::Error>;
}

pub struct DispatchEngine {
    store: Arc<dyn RecipientStore>,
    ledger: Arc<dyn QuotaLedger>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    send_delay: Duration,
    running: Mutex<()>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn RecipientStore>,
        ledger: Arc<dyn QuotaLedger>,
        transport: Arc<dyn Transport>,
        send_delay: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            transport,
            clock: Arc::new(SystemClock),
            send_delay,
            running: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one bounded cycle. Only one cycle may run at a time; a
    /// concurrent call fails fast with [`DispatchError::CycleInProgress`].
    #[tracing::instrument(
        name = "Running a dispatch cycle",
        skip(self, message),
        fields(sent_this_cycle = tracing::field::Empty)
    )]
    pub async fn run_cycle(
        &self,
        daily_limit: u32,
        message: &OutgoingMessage,
    ) -> Result<CycleReport, DispatchError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| DispatchError::CycleInProgress)?;

        let today = self.clock.today();
        let already_sent_today = self
            .ledger
            .current_count(today)
            .await
            .map_err(|source| storage_failure(0, source))?;

        let Some(allowance) = daily_limit
            .checked_sub(already_sent_today)
            .filter(|allowance| *allowance > 0)
        else {
            tracing::info!(already_sent_today, "Daily quota exhausted.");
            return Ok(CycleReport {
                outcome: CycleOutcome::QuotaExhausted,
                daily_limit,
                sent_this_cycle: 0,
                sent_today: already_sent_today,
                remaining_pending: None,
                failures: Vec::new(),
            });
        };

        let batch = self
            .store
            .select_pending(allowance)
            .await
            .map_err(|source| storage_failure(0, source))?;
        if batch.is_empty() {
            tracing::info!("No pending recipients.");
            return Ok(CycleReport {
                outcome: CycleOutcome::NoPendingRecipients,
                daily_limit,
                sent_this_cycle: 0,
                sent_today: already_sent_today,
                remaining_pending: Some(0),
                failures: Vec::new(),
            });
        }

        let (attempts, interruption) = self.deliver_batch(batch, message).await;
        let succeeded = attempts.iter().filter(|a| a.succeeded()).count() as u32;
        tracing::Span::current().record("sent_this_cycle", succeeded);

        let recorded = self.ledger.increment(today, succeeded).await;
        if let Some(source) = interruption {
            if let Err(e) = recorded {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    succeeded,
                    "Failed to record the sends of an interrupted cycle."
                );
            }
            return Err(storage_failure(succeeded, source));
        }
        recorded.map_err(|source| storage_failure(succeeded, source))?;

        let remaining_pending = self
            .store
            .count_by_state(RecipientState::Pending)
            .await
            .map_err(|source| storage_failure(succeeded, source))?;

        Ok(CycleReport {
            outcome: CycleOutcome::Completed,
            daily_limit,
            sent_this_cycle: succeeded,
            sent_today: already_sent_today + succeeded,
            remaining_pending: Some(remaining_pending),
            failures: attempts.iter().filter_map(DeliveryAttempt::failure).collect(),
        })
    }

    /// Sends to every recipient of the batch in order, pausing between
    /// attempts. Stops early only when the store fails; the store error is
    /// returned next to the attempts made so far.
    async fn deliver_batch(
        &self,
        batch: Vec<Recipient>,
        message: &OutgoingMessage,
    ) -> (Vec<DeliveryAttempt>, Option<StoreError>) {
        let mut attempts = Vec::with_capacity(batch.len());

        for (position, recipient) in batch.into_iter().enumerate() {
            if position > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            match self.deliver(&recipient, message).await {
                Ok(result) => attempts.push(DeliveryAttempt {
                    recipient_id: recipient.id(),
                    email: recipient.email().clone(),
                    result,
                }),
                Err(e) => return (attempts, Some(e)),
            }
        }

        (attempts, None)
    }

    /// The outer error is fatal to the cycle, the inner one only to this
    /// recipient.
    #[tracing::instrument(
        name = "Delivering message to recipient",
        skip(self, recipient, message),
        fields(recipient_email = %recipient.email())
    )]
    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &OutgoingMessage,
    ) -> Result<Result<(), DeliveryError>, StoreError> {
        if let Err(e) = self.transport.send(recipient.email(), message).await {
            tracing::warn!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to deliver message. The recipient stays pending."
            );
            return Ok(Err(DeliveryError::Transport(e)));
        }

        match self.store.mark_sent(recipient.id(), self.clock.now()).await {
            Ok(()) => Ok(Ok(())),
            Err(e @ StoreError::NotFound(_)) => {
                tracing::warn!(
                    error.message = %e,
                    "Delivered to a recipient that no longer exists."
                );
                Ok(Err(DeliveryError::Vanished(e)))
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Delivered, but failed to mark the recipient as sent."
                );
                Err(e)
            }
        }
    }
}

fn storage_failure(sent_this_cycle: u32, source: StoreError) -> DispatchError {
    DispatchError::Storage {
        sent_this_cycle,
        source,
    }
}
