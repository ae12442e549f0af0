use super::payment::{Payment, PaymentStatus};
use super::product::Product;
use super::sale::Sale;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Persistence for payment records.
///
/// Implementations must make every conditional write atomic per row: they are
/// the only guard against a callback, a cancellation, a retry and the expiry
/// sweep overwriting one another.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn get_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>>;
    /// Replaces the stored record only if its status is still `expected`.
    /// Returns whether the write happened.
    ///
    /// The stored `retry_count` is kept: only `increment_retry_if_below`
    /// moves it.
    async fn update_if_status(&self, payment: Payment, expected: PaymentStatus) -> Result<bool>;
    /// Adds one to `retry_count` if the payment is still pending and below
    /// `max_retries`. Returns the new count, or `None` when either guard failed.
    async fn increment_retry_if_below(&self, id: Uuid, max_retries: u32) -> Result<Option<u32>>;
    /// Sets `sale_id` only if it is unset. Returns whether the link was made.
    async fn link_sale(&self, payment_id: Uuid, sale_id: Uuid) -> Result<bool>;
    /// Clears `sale_id` only if it still equals `sale_id`.
    async fn unlink_sale(&self, payment_id: Uuid, sale_id: Uuid) -> Result<bool>;
    async fn list_pending_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;
    async fn all(&self) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn store(&self, product: Product) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Product>>;
    /// Atomically removes `quantity` units, failing with `InsufficientStock`
    /// rather than going below zero. Returns the updated product.
    async fn decrement_stock(&self, id: &str, quantity: u32) -> Result<Product>;
    /// Puts back units taken by a sale that could not be recorded.
    async fn restock(&self, id: &str, quantity: u32) -> Result<Product>;
}

#[async_trait]
pub trait SaleStore: Send + Sync {
    async fn create(&self, sale: Sale) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Sale>>;
    async fn find_by_payment(&self, payment_id: Uuid) -> Result<Vec<Sale>>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type ProductStoreRef = Arc<dyn ProductStore>;
pub type SaleStoreRef = Arc<dyn SaleStore>;
