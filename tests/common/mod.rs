#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mpesa_core::application::engine::{PaymentEngine, Stores};
use mpesa_core::application::events::{SaleEventReceiver, sale_event_channel};
use mpesa_core::application::initiator::PaymentRequest;
use mpesa_core::config::{GatewayConfig, PaymentSettings};
use mpesa_core::domain::payment::{Amount, NewPayment, Payment};
use mpesa_core::domain::product::Product;
use mpesa_core::error::{PaymentError, Result};
use mpesa_core::gateway::{
    AccessToken, GatewayTransport, StkPushRequest, StkPushResponse, StkQueryRequest,
    StkQueryResponse,
};
use mpesa_core::infrastructure::in_memory::{
    InMemoryPaymentStore, InMemoryProductStore, InMemorySaleStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How the stub answers an STK push.
#[derive(Clone, Debug)]
pub enum PushMode {
    Accept,
    /// HTTP 200 but a non-zero `ResponseCode`.
    Unaccepted { code: String, description: String },
    Business { code: String, message: String },
    Network,
    Auth,
}

/// How the stub answers a status query.
#[derive(Clone, Debug)]
pub enum QueryMode {
    StillProcessing,
    Result { code: i64, description: String },
}

/// A gateway that never leaves the process and counts every call.
pub struct StubTransport {
    token_calls: AtomicUsize,
    push_calls: AtomicUsize,
    query_calls: AtomicUsize,
    push_mode: Mutex<PushMode>,
    query_mode: Mutex<QueryMode>,
    pushes: Mutex<Vec<StkPushRequest>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token_calls: AtomicUsize::new(0),
            push_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            push_mode: Mutex::new(PushMode::Accept),
            query_mode: Mutex::new(QueryMode::StillProcessing),
            pushes: Mutex::new(Vec::new()),
        })
    }

    pub fn set_push_mode(&self, mode: PushMode) {
        *self.push_mode.lock().unwrap() = mode;
    }

    pub fn set_query_mode(&self, mode: QueryMode) {
        *self.query_mode.lock().unwrap() = mode;
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> Vec<StkPushRequest> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayTransport for StubTransport {
    async fn fetch_token(&self) -> Result<AccessToken> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            access_token: format!("token-{}", n),
            expires_in: 3599,
        })
    }

    async fn stk_push(&self, _token: &str, request: &StkPushRequest) -> Result<StkPushResponse> {
        let n = self.push_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pushes.lock().unwrap().push(request.clone());
        let mode = self.push_mode.lock().unwrap().clone();
        match mode {
            PushMode::Accept => Ok(StkPushResponse {
                merchant_request_id: format!("mr-{}", n),
                checkout_request_id: format!("ws_CO_{}", n),
                response_code: "0".to_string(),
                response_description: "Success. Request accepted for processing".to_string(),
                customer_message: "Success. Request accepted for processing".to_string(),
            }),
            PushMode::Unaccepted { code, description } => Ok(StkPushResponse {
                merchant_request_id: format!("mr-{}", n),
                checkout_request_id: String::new(),
                response_code: code,
                response_description: description,
                customer_message: String::new(),
            }),
            PushMode::Business { code, message } => {
                Err(PaymentError::GatewayBusiness { code, message })
            }
            PushMode::Network => Err(PaymentError::GatewayNetwork(
                "connection refused".to_string(),
            )),
            PushMode::Auth => Err(PaymentError::GatewayAuth("Invalid Access Token".to_string())),
        }
    }

    async fn stk_query(&self, _token: &str, request: &StkQueryRequest) -> Result<StkQueryResponse> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.query_mode.lock().unwrap().clone();
        match mode {
            QueryMode::StillProcessing => Err(PaymentError::GatewayBusiness {
                code: "500.001.1001".to_string(),
                message: "The transaction is being processed".to_string(),
            }),
            QueryMode::Result { code, description } => Ok(StkQueryResponse {
                response_code: "0".to_string(),
                response_description: "The service request has been accepted successfully"
                    .to_string(),
                merchant_request_id: String::new(),
                checkout_request_id: request.checkout_request_id.clone(),
                result_code: Some(code),
                result_desc: description,
            }),
        }
    }
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "passkey".to_string(),
        callback_url: "https://example.com/mpesa/callback".to_string(),
        transaction_type: "CustomerPayBillOnline".to_string(),
        timeout: std::time::Duration::from_secs(5),
    }
}

pub struct Harness {
    pub engine: Arc<PaymentEngine>,
    pub transport: Arc<StubTransport>,
    pub stores: Stores,
    pub events: SaleEventReceiver,
}

pub fn harness() -> Harness {
    harness_with(PaymentSettings::default())
}

pub fn harness_with(settings: PaymentSettings) -> Harness {
    harness_on(settings, in_memory_stores())
}

pub fn in_memory_stores() -> Stores {
    Stores {
        payments: Arc::new(InMemoryPaymentStore::new()),
        products: Arc::new(InMemoryProductStore::new()),
        sales: Arc::new(InMemorySaleStore::new()),
    }
}

pub fn harness_on(settings: PaymentSettings, stores: Stores) -> Harness {
    let transport = StubTransport::new();
    let (sender, events) = sale_event_channel(64);
    let engine = PaymentEngine::new(
        gateway_config(),
        settings,
        transport.clone(),
        stores.clone(),
        Some(sender),
    );
    Harness {
        engine: Arc::new(engine),
        transport,
        stores,
        events,
    }
}

pub fn request(amount: Decimal, phone: &str, product_id: Option<&str>) -> PaymentRequest {
    PaymentRequest {
        shop_id: "shop-1".to_string(),
        product_id: product_id.map(str::to_string),
        amount,
        phone: phone.to_string(),
        account_reference: String::new(),
        description: String::new(),
    }
}

pub async fn add_product(stores: &Stores, id: &str, price: Decimal, stock: u32) {
    stores
        .products
        .store(Product {
            id: id.to_string(),
            shop_id: "shop-1".to_string(),
            name: format!("Product {}", id),
            selling_price: price,
            cost_price: price * dec!(0.75),
            stock,
        })
        .await
        .unwrap();
}

/// Stores a pending payment created `age` ago, bypassing the gateway.
pub async fn seed_pending(stores: &Stores, age: Duration, checkout_id: Option<&str>) -> Payment {
    let created = Utc::now() - age;
    let mut payment = Payment::new(
        NewPayment {
            shop_id: "shop-1".to_string(),
            product_id: None,
            amount: Amount::new(dec!(100), dec!(150000)).unwrap(),
            phone: "254712345678".to_string(),
            account_reference: "shop-1".to_string(),
            description: "Payment".to_string(),
            parent_payment_id: None,
            retry_count: 0,
        },
        created,
        Duration::minutes(5),
    );
    if let Some(checkout_id) = checkout_id {
        payment
            .mark_submitted("mr-seed".to_string(), checkout_id.to_string(), created)
            .unwrap();
    }
    stores.payments.create(payment.clone()).await.unwrap();
    payment
}

pub fn success_callback(checkout_id: &str, amount: &str, receipt: &str) -> String {
    format!(
        r#"{{
  "Body": {{
    "stkCallback": {{
      "MerchantRequestID": "29115-34620561-1",
      "CheckoutRequestID": "{checkout_id}",
      "ResultCode": 0,
      "ResultDesc": "The service request is processed successfully.",
      "CallbackMetadata": {{
        "Item": [
          {{ "Name": "Amount", "Value": {amount} }},
          {{ "Name": "MpesaReceiptNumber", "Value": "{receipt}" }},
          {{ "Name": "Balance" }},
          {{ "Name": "TransactionDate", "Value": 20191219102115 }},
          {{ "Name": "PhoneNumber", "Value": 254712345678 }}
        ]
      }}
    }}
  }}
}}"#
    )
}

pub fn failure_callback(checkout_id: &str, code: i64, description: &str) -> String {
    format!(
        r#"{{
  "Body": {{
    "stkCallback": {{
      "MerchantRequestID": "29115-34620561-1",
      "CheckoutRequestID": "{checkout_id}",
      "ResultCode": {code},
      "ResultDesc": "{description}"
    }}
  }}
}}"#
    )
}
