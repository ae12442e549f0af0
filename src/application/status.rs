use super::callback::CallbackProcessor;
use crate::config::GatewayConfig;
use crate::domain::callback::CallbackResult;
use crate::domain::payment::Payment;
use crate::domain::ports::PaymentStoreRef;
use crate::error::{PaymentError, Result};
use crate::gateway::token::TokenManager;
use crate::gateway::{GatewayTransport, StkQueryRequest, stk_password, stk_timestamp};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Error code the query endpoint uses while the customer has not answered yet.
const STILL_PROCESSING: &str = "500.001.1001";

/// Asks the gateway about a pending payment whose callback has not arrived.
///
/// Only failures are applied. A reported success is left for the callback,
/// which is the only message that carries the receipt number.
pub struct StatusVerifier {
    gateway: GatewayConfig,
    tokens: Arc<TokenManager>,
    transport: Arc<dyn GatewayTransport>,
    payments: PaymentStoreRef,
    callbacks: Arc<CallbackProcessor>,
}

impl StatusVerifier {
    pub fn new(
        gateway: GatewayConfig,
        tokens: Arc<TokenManager>,
        transport: Arc<dyn GatewayTransport>,
        payments: PaymentStoreRef,
        callbacks: Arc<CallbackProcessor>,
    ) -> Self {
        Self {
            gateway,
            tokens,
            transport,
            payments,
            callbacks,
        }
    }

    pub async fn verify(&self, payment_id: Uuid) -> Result<Payment> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        if payment.is_terminal() {
            return Ok(payment);
        }
        let Some(checkout_request_id) = payment.checkout_request_id.clone() else {
            return Ok(payment);
        };

        let token = self.tokens.get_token().await?;
        let timestamp = stk_timestamp(Utc::now());
        let request = StkQueryRequest {
            business_short_code: self.gateway.shortcode.clone(),
            password: stk_password(&self.gateway.shortcode, &self.gateway.passkey, &timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.clone(),
        };

        let response = match self.transport.stk_query(&token, &request).await {
            Ok(response) => response,
            Err(PaymentError::GatewayBusiness { code, .. }) if code == STILL_PROCESSING => {
                tracing::debug!(payment_id = %payment_id, "payment still being processed");
                return Ok(payment);
            }
            Err(PaymentError::GatewayAuth(detail)) => {
                self.tokens.invalidate().await;
                return Err(PaymentError::GatewayAuth(detail));
            }
            Err(err) => return Err(err),
        };

        match response.result_code {
            None => Ok(payment),
            Some(0) => {
                tracing::info!(
                    payment_id = %payment_id,
                    "gateway reports success; waiting for the callback receipt"
                );
                Ok(payment)
            }
            Some(code) => {
                let merchant_request_id = if response.merchant_request_id.is_empty() {
                    payment.merchant_request_id.clone().unwrap_or_default()
                } else {
                    response.merchant_request_id
                };
                self.callbacks
                    .apply(CallbackResult {
                        merchant_request_id,
                        checkout_request_id,
                        result_code: code,
                        result_desc: response.result_desc,
                        amount: None,
                        receipt_number: None,
                        transaction_id: None,
                        phone_number: None,
                        transaction_date: None,
                    })
                    .await
            }
        }
    }
}
