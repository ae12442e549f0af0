use super::initiator::{Initiation, PaymentInitiator, PaymentRequest};
use crate::domain::payment::Payment;
use crate::domain::ports::PaymentStoreRef;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Re-prompts the customer for a payment that is still waiting.
pub struct RetryManager {
    payments: PaymentStoreRef,
    initiator: Arc<PaymentInitiator>,
    max_retries: u32,
}

impl RetryManager {
    pub fn new(
        payments: PaymentStoreRef,
        initiator: Arc<PaymentInitiator>,
        max_retries: u32,
    ) -> Self {
        Self {
            payments,
            initiator,
            max_retries,
        }
    }

    /// Bumps the original's retry counter and submits a brand new payment with
    /// the same details. The original stays as the record of the first attempt.
    ///
    /// The new payment inherits the bumped counter, so a chain of retries
    /// shares one budget. The bump is a single guarded store write, so
    /// concurrent retries can never spend more than `max_retries`.
    pub async fn retry_payment(&self, payment_id: Uuid) -> Result<Initiation> {
        let original = self.load(payment_id).await?;
        original.ensure_retryable(Utc::now(), self.max_retries)?;

        let Some(retry_count) = self
            .payments
            .increment_retry_if_below(payment_id, self.max_retries)
            .await?
        else {
            // Lost the race: report whatever the fresh record now says.
            let current = self.load(payment_id).await?;
            current.ensure_retryable(Utc::now(), self.max_retries)?;
            return Err(PaymentError::InvalidPaymentState {
                id: payment_id,
                status: current.status,
                action: "retried",
            });
        };

        tracing::info!(payment_id = %payment_id, retry_count, "retrying payment");
        self.initiator
            .initiate_retry(PaymentRequest::from_payment(&original), original.id, retry_count)
            .await
    }

    async fn load(&self, payment_id: Uuid) -> Result<Payment> {
        self.payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))
    }
}
