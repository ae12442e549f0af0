use crate::domain::payment::PaymentStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Gateway authentication failed: {0}")]
    GatewayAuth(String),
    #[error("Gateway unreachable: {0}")]
    GatewayNetwork(String),
    #[error("Gateway rejected the request [{code}]: {message}")]
    GatewayBusiness { code: String, message: String },
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),
    #[error("Payment {0} has expired")]
    PaymentExpired(Uuid),
    #[error("Payment {id} is {status} and cannot be {action}")]
    InvalidPaymentState {
        id: Uuid,
        status: PaymentStatus,
        action: &'static str,
    },
    #[error("Payment {id} has already been retried {max} times")]
    MaxRetriesExceeded { id: Uuid, max: u32 },
    #[error("Invalid callback payload: {0}")]
    InvalidCallback(String),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: u32,
    },
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
