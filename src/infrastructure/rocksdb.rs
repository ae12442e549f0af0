use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{PaymentStore, ProductStore, SaleStore};
use crate::domain::product::Product;
use crate::domain::sale::Sale;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping a checkout request id to its payment id.
pub const CF_CHECKOUT_INDEX: &str = "checkout_index";
pub const CF_PRODUCTS: &str = "products";
pub const CF_SALES: &str = "sales";

/// A persistent store implementation using RocksDB.
///
/// Payments, products and sales live in separate Column Families. Writes that
/// read before they write (the guarded payment updates and the stock moves)
/// go through a single async mutex so they stay atomic across tasks sharing
/// the store.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_PAYMENTS, CF_CHECKOUT_INDEX, CF_PRODUCTS, CF_SALES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, encode(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| {
                PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                    "RocksDB iteration error: {}",
                    e
                ))))
            })?;
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }

    /// Callers must hold `write_lock`.
    fn payment_for_update(&self, id: Uuid) -> Result<Payment> {
        self.read(CF_PAYMENTS, id.as_bytes())?
            .ok_or_else(|| PaymentError::PaymentNotFound(id.to_string()))
    }

    /// Writes the payment and its checkout index entry in one batch.
    fn put_payment(&self, payment: &Payment) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_PAYMENTS)?, payment.id.as_bytes(), encode(payment)?);
        if let Some(checkout_id) = &payment.checkout_request_id {
            batch.put_cf(
                self.cf(CF_CHECKOUT_INDEX)?,
                checkout_id.as_bytes(),
                payment.id.as_bytes(),
            );
        }
        self.db.write(batch)?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put_payment(&payment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, id.as_bytes())
    }

    async fn get_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<Payment>> {
        let cf = self.cf(CF_CHECKOUT_INDEX)?;
        let Some(raw_id) = self.db.get_cf(cf, checkout_request_id.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&raw_id).map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        self.read(CF_PAYMENTS, id.as_bytes())
    }

    async fn update_if_status(
        &self,
        mut payment: Payment,
        expected: PaymentStatus,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let current: Option<Payment> = self.read(CF_PAYMENTS, payment.id.as_bytes())?;
        match current {
            Some(current) if current.status == expected => {
                payment.retry_count = current.retry_count;
                self.put_payment(&payment)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PaymentError::PaymentNotFound(payment.id.to_string())),
        }
    }

    async fn increment_retry_if_below(&self, id: Uuid, max_retries: u32) -> Result<Option<u32>> {
        let _guard = self.write_lock.lock().await;
        let mut payment = self.payment_for_update(id)?;
        if payment.status != PaymentStatus::Pending || payment.retry_count >= max_retries {
            return Ok(None);
        }
        payment.retry_count += 1;
        payment.updated_at = Utc::now();
        self.write(CF_PAYMENTS, id.as_bytes(), &payment)?;
        Ok(Some(payment.retry_count))
    }

    async fn link_sale(&self, payment_id: Uuid, sale_id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut payment = self.payment_for_update(payment_id)?;
        if payment.sale_id.is_some() {
            return Ok(false);
        }
        payment.sale_id = Some(sale_id);
        payment.updated_at = Utc::now();
        self.write(CF_PAYMENTS, payment_id.as_bytes(), &payment)?;
        Ok(true)
    }

    async fn unlink_sale(&self, payment_id: Uuid, sale_id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut payment = self.payment_for_update(payment_id)?;
        if payment.sale_id != Some(sale_id) {
            return Ok(false);
        }
        payment.sale_id = None;
        payment.updated_at = Utc::now();
        self.write(CF_PAYMENTS, payment_id.as_bytes(), &payment)?;
        Ok(true)
    }

    async fn list_pending_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        Ok(payments
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Pending && p.is_expired_at(cutoff))
            .collect())
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.scan(CF_PAYMENTS)?;
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

#[async_trait]
impl ProductStore for RocksDBStore {
    async fn store(&self, product: Product) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(CF_PRODUCTS, product.id.as_bytes(), &product)
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        self.read(CF_PRODUCTS, id.as_bytes())
    }

    async fn decrement_stock(&self, id: &str, quantity: u32) -> Result<Product> {
        let _guard = self.write_lock.lock().await;
        let mut product: Product = self
            .read(CF_PRODUCTS, id.as_bytes())?
            .ok_or_else(|| PaymentError::ProductNotFound(id.to_string()))?;
        if product.stock < quantity {
            return Err(PaymentError::InsufficientStock {
                product_id: id.to_string(),
                requested: quantity,
                available: product.stock,
            });
        }
        product.stock -= quantity;
        self.write(CF_PRODUCTS, id.as_bytes(), &product)?;
        Ok(product)
    }

    async fn restock(&self, id: &str, quantity: u32) -> Result<Product> {
        let _guard = self.write_lock.lock().await;
        let mut product: Product = self
            .read(CF_PRODUCTS, id.as_bytes())?
            .ok_or_else(|| PaymentError::ProductNotFound(id.to_string()))?;
        product.stock = product.stock.saturating_add(quantity);
        self.write(CF_PRODUCTS, id.as_bytes(), &product)?;
        Ok(product)
    }
}

#[async_trait]
impl SaleStore for RocksDBStore {
    async fn create(&self, sale: Sale) -> Result<()> {
        self.write(CF_SALES, sale.id.as_bytes(), &sale)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Sale>> {
        self.read(CF_SALES, id.as_bytes())
    }

    async fn find_by_payment(&self, payment_id: Uuid) -> Result<Vec<Sale>> {
        let sales: Vec<Sale> = self.scan(CF_SALES)?;
        Ok(sales
            .into_iter()
            .filter(|s| s.payment_id == payment_id)
            .collect())
    }
}
