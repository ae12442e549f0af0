use crate::error::{PaymentError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A validated payment amount in Kenyan shillings.
///
/// Always strictly positive and never above the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal, max: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {}",
                value
            )));
        }
        if value > max {
            return Err(PaymentError::InvalidAmount(format!(
                "amount {} exceeds the maximum of {}",
                value, max
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The amount as sent to the gateway, which only accepts whole shillings.
    pub fn whole_shillings(&self) -> Decimal {
        self.0.ceil()
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to open a new payment record.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub shop_id: String,
    pub product_id: Option<String>,
    pub amount: Amount,
    /// Already normalized to `254XXXXXXXXX`.
    pub phone: String,
    pub account_reference: String,
    pub description: String,
    pub parent_payment_id: Option<Uuid>,
    pub retry_count: u32,
}

/// One attempted STK push money movement.
///
/// Records are never deleted. Once terminal, only `sale_id` may still change,
/// and only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub shop_id: String,
    pub product_id: Option<String>,
    pub amount: Amount,
    pub phone: String,
    pub account_reference: String,
    pub description: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    /// The payment this one was retried from, if any.
    pub parent_payment_id: Option<Uuid>,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub receipt_number: Option<String>,
    pub transaction_id: Option<String>,
    pub sale_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(new: NewPayment, now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id: new.shop_id,
            product_id: new.product_id,
            amount: new.amount,
            phone: new.phone,
            account_reference: new.account_reference,
            description: new.description,
            status: PaymentStatus::Pending,
            failure_reason: None,
            retry_count: new.retry_count,
            parent_payment_id: new.parent_payment_id,
            merchant_request_id: None,
            checkout_request_id: None,
            receipt_number: None,
            transaction_id: None,
            sale_id: None,
            created_at: now,
            expires_at: now + timeout,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Records the identifiers the gateway assigned on accepting the push.
    pub fn mark_submitted(
        &mut self,
        merchant_request_id: String,
        checkout_request_id: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending("submitted")?;
        self.merchant_request_id = Some(merchant_request_id);
        self.checkout_request_id = Some(checkout_request_id);
        self.updated_at = now;
        Ok(())
    }

    /// Pending -> Completed, writing the receipt in the same step.
    pub fn complete(
        &mut self,
        receipt_number: String,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending("completed")?;
        self.status = PaymentStatus::Completed;
        self.receipt_number = Some(receipt_number);
        self.transaction_id = transaction_id;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Pending -> Failed
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.terminate(PaymentStatus::Failed, "failed", reason.into(), now)
    }

    /// Pending -> Timeout
    pub fn time_out(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.terminate(PaymentStatus::Timeout, "timed out", reason.into(), now)
    }

    /// Pending -> Cancelled
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.terminate(PaymentStatus::Cancelled, "cancelled", reason.into(), now)
    }

    /// Checks every precondition of a retry, in the order callers report them.
    pub fn ensure_retryable(&self, now: DateTime<Utc>, max_retries: u32) -> Result<()> {
        self.ensure_pending("retried")?;
        if self.is_expired_at(now) {
            return Err(PaymentError::PaymentExpired(self.id));
        }
        if self.retry_count >= max_retries {
            return Err(PaymentError::MaxRetriesExceeded {
                id: self.id,
                max: max_retries,
            });
        }
        Ok(())
    }

    fn terminate(
        &mut self,
        status: PaymentStatus,
        action: &'static str,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending(action)?;
        self.status = status;
        self.failure_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self, action: &'static str) -> Result<()> {
        if self.status == PaymentStatus::Pending {
            Ok(())
        } else {
            Err(PaymentError::InvalidPaymentState {
                id: self.id,
                status: self.status,
                action,
            })
        }
    }
}
