use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{PaymentStore, ProductStore, SaleStore};
use crate::domain::product::Product;
use crate::domain::sale::Sale;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct PaymentTable {
    rows: HashMap<Uuid, Payment>,
    by_checkout: HashMap<String, Uuid>,
}

impl PaymentTable {
    fn put(&mut self, payment: Payment) {
        if let Some(checkout_id) = &payment.checkout_request_id {
            self.by_checkout.insert(checkout_id.clone(), payment.id);
        }
        self.rows.insert(payment.id, payment);
    }
}

/// A thread-safe in-memory store for payment records.
///
/// The rows and the checkout-id index live behind one `RwLock`, so the
/// conditional writes are atomic with respect to every other call.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    table: Arc<RwLock<PaymentTable>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        let mut table = self.table.write().await;
        table.put(payment);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn get_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .by_checkout
            .get(checkout_request_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn update_if_status(
        &self,
        mut payment: Payment,
        expected: PaymentStatus,
    ) -> Result<bool> {
        let mut table = self.table.write().await;
        match table
            .rows
            .get(&payment.id)
            .map(|current| (current.status, current.retry_count))
        {
            Some((status, retry_count)) if status == expected => {
                payment.retry_count = retry_count;
                table.put(payment);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PaymentError::PaymentNotFound(payment.id.to_string())),
        }
    }

    async fn increment_retry_if_below(&self, id: Uuid, max_retries: u32) -> Result<Option<u32>> {
        let mut table = self.table.write().await;
        let payment = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| PaymentError::PaymentNotFound(id.to_string()))?;
        if payment.status != PaymentStatus::Pending || payment.retry_count >= max_retries {
            return Ok(None);
        }
        payment.retry_count += 1;
        payment.updated_at = Utc::now();
        Ok(Some(payment.retry_count))
    }

    async fn link_sale(&self, payment_id: Uuid, sale_id: Uuid) -> Result<bool> {
        let mut table = self.table.write().await;
        let payment = table
            .rows
            .get_mut(&payment_id)
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        if payment.sale_id.is_some() {
            return Ok(false);
        }
        payment.sale_id = Some(sale_id);
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn unlink_sale(&self, payment_id: Uuid, sale_id: Uuid) -> Result<bool> {
        let mut table = self.table.write().await;
        let payment = table
            .rows
            .get_mut(&payment_id)
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        if payment.sale_id != Some(sale_id) {
            return Ok(false);
        }
        payment.sale_id = None;
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_pending_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.is_expired_at(cutoff))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        let table = self.table.read().await;
        let mut payments: Vec<Payment> = table.rows.values().cloned().collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

/// A thread-safe in-memory product catalogue.
#[derive(Default, Clone)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<String, Product>>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn store(&self, product: Product) -> Result<()> {
        let mut products = self.products.write().await;
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products.get(id).cloned())
    }

    async fn decrement_stock(&self, id: &str, quantity: u32) -> Result<Product> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(id)
            .ok_or_else(|| PaymentError::ProductNotFound(id.to_string()))?;
        if product.stock < quantity {
            return Err(PaymentError::InsufficientStock {
                product_id: id.to_string(),
                requested: quantity,
                available: product.stock,
            });
        }
        product.stock -= quantity;
        Ok(product.clone())
    }

    async fn restock(&self, id: &str, quantity: u32) -> Result<Product> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(id)
            .ok_or_else(|| PaymentError::ProductNotFound(id.to_string()))?;
        product.stock = product.stock.saturating_add(quantity);
        Ok(product.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemorySaleStore {
    sales: Arc<RwLock<HashMap<Uuid, Sale>>>,
}

impl InMemorySaleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SaleStore for InMemorySaleStore {
    async fn create(&self, sale: Sale) -> Result<()> {
        let mut sales = self.sales.write().await;
        sales.insert(sale.id, sale);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Sale>> {
        let sales = self.sales.read().await;
        Ok(sales.get(&id).cloned())
    }

    async fn find_by_payment(&self, payment_id: Uuid) -> Result<Vec<Sale>> {
        let sales = self.sales.read().await;
        Ok(sales
            .values()
            .filter(|s| s.payment_id == payment_id)
            .cloned()
            .collect())
    }
}
