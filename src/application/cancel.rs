use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::PaymentStoreRef;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use uuid::Uuid;

pub const DEFAULT_CANCEL_REASON: &str = "Cancelled by the merchant";

/// Pending -> Cancelled. Cancelling twice is fine; cancelling a settled
/// payment is not.
pub async fn cancel_payment(
    payments: &PaymentStoreRef,
    payment_id: Uuid,
    reason: Option<String>,
) -> Result<Payment> {
    let payment = payments
        .get(payment_id)
        .await?
        .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

    match payment.status {
        PaymentStatus::Cancelled => return Ok(payment),
        PaymentStatus::Pending => {}
        status => {
            return Err(PaymentError::InvalidPaymentState {
                id: payment_id,
                status,
                action: "cancelled",
            });
        }
    }

    let mut updated = payment;
    updated.cancel(
        reason.unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string()),
        Utc::now(),
    )?;

    if payments
        .update_if_status(updated.clone(), PaymentStatus::Pending)
        .await?
    {
        tracing::info!(payment_id = %payment_id, "payment cancelled");
        return Ok(updated);
    }

    // Lost the race to a callback or the expiry sweep.
    let current = payments
        .get(payment_id)
        .await?
        .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
    if current.status == PaymentStatus::Cancelled {
        Ok(current)
    } else {
        Err(PaymentError::InvalidPaymentState {
            id: payment_id,
            status: current.status,
            action: "cancelled",
        })
    }
}
