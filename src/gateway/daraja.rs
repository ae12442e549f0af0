use super::codes;
use super::{
    AccessToken, GatewayErrorBody, GatewayTransport, StkPushRequest, StkPushResponse,
    StkQueryRequest, StkQueryResponse,
};
use crate::config::GatewayConfig;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const OAUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

/// HTTP transport for the Safaricom Daraja API.
pub struct DarajaClient {
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    client: reqwest::Client,
}

impl DarajaClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5).min(config.timeout))
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, token: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

#[async_trait]
impl GatewayTransport for DarajaClient {
    async fn fetch_token(&self) -> Result<AccessToken> {
        let response = self
            .client
            .get(self.url(OAUTH_PATH))
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = body.chars().take(200).collect::<String>();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    PaymentError::GatewayAuth(format!("rate limited: {}", detail))
                }
                s if s.is_server_error() => {
                    PaymentError::GatewayNetwork(format!("OAuth HTTP {}: {}", s.as_u16(), detail))
                }
                s => PaymentError::GatewayAuth(format!("OAuth HTTP {}: {}", s.as_u16(), detail)),
            });
        }

        response
            .json::<AccessToken>()
            .await
            .map_err(|e| PaymentError::GatewayAuth(format!("unreadable token response: {}", e)))
    }

    async fn stk_push(&self, token: &str, request: &StkPushRequest) -> Result<StkPushResponse> {
        self.post_json(STK_PUSH_PATH, token, request).await
    }

    async fn stk_query(&self, token: &str, request: &StkQueryRequest) -> Result<StkQueryResponse> {
        self.post_json(STK_QUERY_PATH, token, request).await
    }
}

fn transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::GatewayNetwork("gateway timed out".to_string())
    } else {
        PaymentError::GatewayNetwork(err.to_string())
    }
}

/// Success bodies decode into `T`; error bodies become auth or business errors;
/// anything unreadable counts as a transport failure.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| {
            PaymentError::GatewayNetwork(format!("unreadable gateway response: {}", e))
        });
    }

    match serde_json::from_str::<GatewayErrorBody>(&body) {
        Ok(error)
            if status == StatusCode::UNAUTHORIZED || codes::is_auth_code(&error.error_code) =>
        {
            Err(PaymentError::GatewayAuth(error.error_message))
        }
        Ok(error) => Err(PaymentError::GatewayBusiness {
            code: error.error_code,
            message: error.error_message,
        }),
        Err(_) if status == StatusCode::UNAUTHORIZED => {
            Err(PaymentError::GatewayAuth(format!("HTTP {}", status.as_u16())))
        }
        Err(_) => Err(PaymentError::GatewayNetwork(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body.chars().take(200).collect::<String>()
        ))),
    }
}
