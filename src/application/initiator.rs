use crate::config::{GatewayConfig, PaymentSettings};
use crate::domain::payment::{Amount, NewPayment, Payment, PaymentStatus};
use crate::domain::phone::normalize_phone;
use crate::domain::ports::PaymentStoreRef;
use crate::error::{PaymentError, Result};
use crate::gateway::token::TokenManager;
use crate::gateway::{
    GatewayTransport, StkPushRequest, StkPushResponse, codes, stk_password, stk_timestamp,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use uuid::Uuid;

// Field limits the gateway enforces on the push request.
const ACCOUNT_REFERENCE_MAX: usize = 12;
const TRANSACTION_DESC_MAX: usize = 13;

/// A merchant's request to collect money from a phone.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub shop_id: String,
    pub product_id: Option<String>,
    pub amount: Decimal,
    pub phone: String,
    pub account_reference: String,
    pub description: String,
}

impl PaymentRequest {
    /// Rebuilds the request that produced `payment`.
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            shop_id: payment.shop_id.clone(),
            product_id: payment.product_id.clone(),
            amount: payment.amount.value(),
            phone: payment.phone.clone(),
            account_reference: payment.account_reference.clone(),
            description: payment.description.clone(),
        }
    }
}

/// The persisted payment plus what the gateway said about it.
///
/// The payment is stored whatever the outcome: `Pending` when the push was
/// accepted, `Failed` with a readable reason otherwise.
#[derive(Debug)]
pub struct Initiation {
    pub payment: Payment,
    pub outcome: Result<StkPushResponse>,
}

impl Initiation {
    pub fn is_accepted(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct PaymentInitiator {
    gateway: GatewayConfig,
    settings: PaymentSettings,
    tokens: Arc<TokenManager>,
    transport: Arc<dyn GatewayTransport>,
    payments: PaymentStoreRef,
}

impl PaymentInitiator {
    pub fn new(
        gateway: GatewayConfig,
        settings: PaymentSettings,
        tokens: Arc<TokenManager>,
        transport: Arc<dyn GatewayTransport>,
        payments: PaymentStoreRef,
    ) -> Self {
        Self {
            gateway,
            settings,
            tokens,
            transport,
            payments,
        }
    }

    /// Validates, records and submits an STK push.
    ///
    /// Invalid amounts and phone numbers are rejected before anything is
    /// stored or sent. Gateway failures are not retried here.
    pub async fn initiate(&self, request: PaymentRequest) -> Result<Initiation> {
        self.open(request, None, 0).await
    }

    /// Same as `initiate`, for a payment that re-submits `parent`.
    pub async fn initiate_retry(
        &self,
        request: PaymentRequest,
        parent: Uuid,
        retry_count: u32,
    ) -> Result<Initiation> {
        self.open(request, Some(parent), retry_count).await
    }

    async fn open(
        &self,
        request: PaymentRequest,
        parent_payment_id: Option<Uuid>,
        retry_count: u32,
    ) -> Result<Initiation> {
        let amount = Amount::new(request.amount, self.settings.max_amount)?;
        let phone = normalize_phone(&request.phone)?;

        let account_reference = if request.account_reference.trim().is_empty() {
            request.shop_id.clone()
        } else {
            request.account_reference
        };
        let description = if request.description.trim().is_empty() {
            "Payment".to_string()
        } else {
            request.description
        };

        let mut payment = Payment::new(
            NewPayment {
                shop_id: request.shop_id,
                product_id: request.product_id,
                amount,
                phone,
                account_reference,
                description,
                parent_payment_id,
                retry_count,
            },
            Utc::now(),
            self.settings.payment_timeout,
        );
        self.payments.create(payment.clone()).await?;
        tracing::info!(
            payment_id = %payment.id,
            shop_id = %payment.shop_id,
            amount = %payment.amount.value(),
            "payment opened"
        );

        let outcome = self.submit(&payment).await;
        match &outcome {
            Ok(response) => {
                payment.mark_submitted(
                    response.merchant_request_id.clone(),
                    response.checkout_request_id.clone(),
                    Utc::now(),
                )?;
                tracing::info!(
                    payment_id = %payment.id,
                    checkout_request_id = %response.checkout_request_id,
                    "STK push accepted"
                );
            }
            Err(err) => {
                if matches!(err, PaymentError::GatewayAuth(_)) {
                    self.tokens.invalidate().await;
                }
                payment.fail(failure_reason(err), Utc::now())?;
                tracing::warn!(payment_id = %payment.id, error = %err, "STK push failed");
            }
        }

        let payment = self.persist(payment).await?;
        Ok(Initiation { payment, outcome })
    }

    async fn submit(&self, payment: &Payment) -> Result<StkPushResponse> {
        let token = self.tokens.get_token().await?;
        let timestamp = stk_timestamp(Utc::now());
        let amount = payment.amount.whole_shillings().to_u64().ok_or_else(|| {
            PaymentError::InvalidAmount(format!(
                "{} cannot be sent as whole shillings",
                payment.amount.value()
            ))
        })?;

        let request = StkPushRequest {
            business_short_code: self.gateway.shortcode.clone(),
            password: stk_password(&self.gateway.shortcode, &self.gateway.passkey, &timestamp),
            timestamp,
            transaction_type: self.gateway.transaction_type.clone(),
            amount,
            party_a: payment.phone.clone(),
            party_b: self.gateway.shortcode.clone(),
            phone_number: payment.phone.clone(),
            callback_url: self.gateway.callback_url.clone(),
            account_reference: truncate(&payment.account_reference, ACCOUNT_REFERENCE_MAX),
            transaction_desc: truncate(&payment.description, TRANSACTION_DESC_MAX),
        };

        let response = self
            .transport
            .stk_push(&token, &request)
            .await
            .map_err(|err| match err {
                PaymentError::GatewayBusiness { code, message } => PaymentError::GatewayBusiness {
                    message: codes::readable_reason(&code, &message),
                    code,
                },
                other => other,
            })?;

        if !response.is_accepted() {
            return Err(PaymentError::GatewayBusiness {
                message: codes::readable_reason(
                    &response.response_code,
                    &response.response_description,
                ),
                code: response.response_code,
            });
        }
        Ok(response)
    }

    /// Writes the submission outcome unless something else already moved the
    /// payment on, in which case the stored record wins.
    async fn persist(&self, payment: Payment) -> Result<Payment> {
        let id = payment.id;
        if self
            .payments
            .update_if_status(payment.clone(), PaymentStatus::Pending)
            .await?
        {
            return Ok(payment);
        }
        tracing::warn!(payment_id = %id, "payment settled before its submission was recorded");
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(id.to_string()))
    }
}

/// The reason stored on a payment the gateway did not accept.
fn failure_reason(err: &PaymentError) -> String {
    match err {
        PaymentError::GatewayBusiness { message, .. } => message.clone(),
        PaymentError::GatewayNetwork(detail) => format!("Could not reach M-Pesa: {}", detail),
        PaymentError::GatewayAuth(detail) => {
            format!("M-Pesa rejected the merchant credentials: {}", detail)
        }
        other => other.to_string(),
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
