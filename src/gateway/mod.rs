//! The Daraja gateway: wire types, the transport seam and the token cache.

use crate::error::Result;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod codes;
pub mod daraja;
pub mod token;

/// Response code the gateway uses for an accepted request.
pub const ACCEPTED: &str = "0";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in seconds. Daraja sends it as a string.
    #[serde(deserialize_with = "u64_from_string_or_number")]
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: u64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl StkPushResponse {
    pub fn is_accepted(&self) -> bool {
        self.response_code.trim() == ACCEPTED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StkQueryRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(
        rename = "ResultCode",
        default,
        deserialize_with = "opt_i64_from_string_or_number"
    )]
    pub result_code: Option<i64>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
}

/// Error body the gateway returns with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(rename = "requestId", default)]
    pub request_id: String,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "errorMessage", default)]
    pub error_message: String,
}

/// Outbound calls to the gateway. `DarajaClient` talks HTTP; tests plug in stubs.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Exchanges the consumer key and secret for a bearer token.
    async fn fetch_token(&self) -> Result<AccessToken>;
    async fn stk_push(&self, token: &str, request: &StkPushRequest) -> Result<StkPushResponse>;
    async fn stk_query(&self, token: &str, request: &StkQueryRequest) -> Result<StkQueryResponse>;
}

/// `YYYYMMDDHHMMSS` in East Africa Time, the clock the gateway validates against.
pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    // EAT is UTC+3 all year round.
    (now.naive_utc() + TimeDelta::hours(3))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// base64(shortcode + passkey + timestamp)
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

fn u64_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

fn opt_i64_from_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_i64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected a result code, got {}",
            other
        ))),
    }
}
