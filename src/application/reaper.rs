use crate::domain::payment::PaymentStatus;
use crate::domain::ports::PaymentStoreRef;
use crate::error::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;

pub const TIMEOUT_REASON: &str = "Payment request timed out: no response from the customer";

/// Times out pending payments whose deadline passed without a callback.
#[derive(Clone)]
pub struct ExpiryReaper {
    payments: PaymentStoreRef,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(payments: PaymentStoreRef, interval: Duration) -> Self {
        Self { payments, interval }
    }

    /// One pass over the expired pending payments. Returns how many were timed out.
    ///
    /// Each write is conditional on the payment still being pending, so a
    /// callback that lands mid-sweep keeps its result.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let expired = self.payments.list_pending_expired_before(now).await?;
        let mut timed_out = 0;

        for payment in expired {
            let id = payment.id;
            let mut updated = payment;
            if updated.time_out(TIMEOUT_REASON, now).is_err() {
                continue;
            }
            if self
                .payments
                .update_if_status(updated, PaymentStatus::Pending)
                .await?
            {
                tracing::info!(payment_id = %id, "payment timed out");
                timed_out += 1;
            } else {
                tracing::debug!(payment_id = %id, "payment settled during sweep");
            }
        }
        Ok(timed_out)
    }

    /// Sweeps on every tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(timed_out = n, "expiry sweep finished"),
                        Err(err) => tracing::error!("expiry sweep error: {}", err),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("expiry reaper stopping");
                        break;
                    }
                }
            }
        }
    }
}
