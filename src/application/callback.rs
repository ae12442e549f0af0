use super::reconciler::SaleReconciler;
use crate::domain::callback::CallbackResult;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::PaymentStoreRef;
use crate::error::{PaymentError, Result};
use crate::gateway::codes;
use chrono::Utc;
use std::sync::Arc;

/// Applies the gateway's asynchronous result to the payment it belongs to.
pub struct CallbackProcessor {
    payments: PaymentStoreRef,
    reconciler: Arc<SaleReconciler>,
}

impl CallbackProcessor {
    pub fn new(payments: PaymentStoreRef, reconciler: Arc<SaleReconciler>) -> Self {
        Self {
            payments,
            reconciler,
        }
    }

    /// Parses a raw callback body and applies it.
    pub async fn process_callback(&self, raw: &[u8]) -> Result<Payment> {
        let result = CallbackResult::parse(raw)?;
        self.apply(result).await
    }

    /// Applies a result to its payment.
    ///
    /// Unknown checkout ids are an error and change nothing. Results for a
    /// payment that is already terminal are accepted and ignored, since the
    /// gateway redelivers callbacks.
    pub async fn apply(&self, result: CallbackResult) -> Result<Payment> {
        let payment = self
            .payments
            .get_by_checkout_id(&result.checkout_request_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(result.checkout_request_id.clone()))?;

        if payment.is_terminal() {
            tracing::debug!(
                payment_id = %payment.id,
                checkout_request_id = %result.checkout_request_id,
                status = %payment.status,
                "ignoring callback for settled payment"
            );
            return Ok(payment);
        }

        let mut updated = payment.clone();
        let now = Utc::now();
        if result.is_success() {
            let receipt = result.receipt_number.clone().ok_or_else(|| {
                PaymentError::InvalidCallback(format!(
                    "successful result for {} carries no receipt",
                    result.checkout_request_id
                ))
            })?;
            if let Some(paid) = result.amount
                && paid != payment.amount.value()
            {
                tracing::warn!(
                    payment_id = %payment.id,
                    requested = %payment.amount.value(),
                    paid = %paid,
                    "callback amount differs from requested amount"
                );
            }
            updated.complete(receipt, result.transaction_id.clone(), now)?;
        } else {
            let code = result.result_code.to_string();
            let reason = if result.result_desc.trim().is_empty() {
                codes::readable_reason(&code, "")
            } else {
                result.result_desc.clone()
            };
            updated.fail(reason, now)?;
        }

        // Status and receipt go down in one guarded write.
        if !self
            .payments
            .update_if_status(updated.clone(), PaymentStatus::Pending)
            .await?
        {
            let current = self
                .payments
                .get(payment.id)
                .await?
                .ok_or_else(|| PaymentError::PaymentNotFound(payment.id.to_string()))?;
            tracing::info!(
                payment_id = %payment.id,
                status = %current.status,
                "payment settled concurrently; callback ignored"
            );
            return Ok(current);
        }

        tracing::info!(
            payment_id = %updated.id,
            checkout_request_id = %result.checkout_request_id,
            result_code = result.result_code,
            status = %updated.status,
            "callback applied"
        );

        if updated.status == PaymentStatus::Completed && updated.product_id.is_some() {
            // The payment stays completed whatever happens here.
            match self.reconciler.reconcile(&updated).await {
                Ok(_) => {
                    if let Some(latest) = self.payments.get(updated.id).await? {
                        updated = latest;
                    }
                }
                Err(err) => tracing::error!(
                    payment_id = %updated.id,
                    error = %err,
                    "reconciliation failed for completed payment"
                ),
            }
        }

        Ok(updated)
    }
}
