use super::events::{SaleEvent, SaleEventSender};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{PaymentStoreRef, ProductStoreRef, SaleStoreRef};
use crate::domain::product::Product;
use crate::domain::sale::{Sale, resolve_quantity};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use uuid::Uuid;

/// Attempts at taking stock when other sales drain it between read and write.
const STOCK_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    Recorded(Sale),
    /// The payment already points at a sale; nothing was touched.
    AlreadyLinked(Uuid),
    /// The product had no stock. The payment stays completed without a sale.
    OutOfStock,
    /// Not completed, or not linked to a product.
    NotApplicable,
}

/// Turns a completed payment into a stock deduction and a sale record.
pub struct SaleReconciler {
    payments: PaymentStoreRef,
    products: ProductStoreRef,
    sales: SaleStoreRef,
    events: Option<SaleEventSender>,
}

impl SaleReconciler {
    pub fn new(payments: PaymentStoreRef, products: ProductStoreRef, sales: SaleStoreRef) -> Self {
        Self {
            payments,
            products,
            sales,
            events: None,
        }
    }

    pub fn with_events(mut self, events: SaleEventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Records at most one sale per payment.
    ///
    /// The sale id is linked onto the payment before any stock moves, so two
    /// reconciliations of the same payment can never both deduct stock. If
    /// anything fails after that, the claim is released and any stock taken
    /// is put back, leaving the payment ready for another attempt.
    pub async fn reconcile(&self, payment: &Payment) -> Result<Reconciliation> {
        if payment.status != PaymentStatus::Completed {
            return Ok(Reconciliation::NotApplicable);
        }
        let Some(product_id) = payment.product_id.as_deref() else {
            return Ok(Reconciliation::NotApplicable);
        };
        if let Some(sale_id) = payment.sale_id {
            return Ok(Reconciliation::AlreadyLinked(sale_id));
        }

        let product = self.load_product(product_id).await?;
        if product.is_out_of_stock() {
            self.report_inventory_short(payment, product_id);
            return Ok(Reconciliation::OutOfStock);
        }

        let sale_id = Uuid::new_v4();
        if !self.payments.link_sale(payment.id, sale_id).await? {
            let linked = self
                .payments
                .get(payment.id)
                .await?
                .and_then(|p| p.sale_id)
                .unwrap_or(sale_id);
            tracing::debug!(payment_id = %payment.id, sale_id = %linked, "sale already linked");
            return Ok(Reconciliation::AlreadyLinked(linked));
        }

        let sale = match self.record_sale(payment, product, sale_id).await {
            Ok(sale) => sale,
            Err(err) => {
                self.release_claim(payment.id, sale_id).await;
                return Err(err);
            }
        };

        tracing::info!(
            payment_id = %payment.id,
            sale_id = %sale.id,
            product_id = %sale.product_id,
            quantity = sale.quantity,
            "payment reconciled into sale"
        );
        self.emit(SaleEvent::Recorded {
            sale: sale.clone(),
            phone: payment.phone.clone(),
        });
        Ok(Reconciliation::Recorded(sale))
    }

    async fn record_sale(
        &self,
        payment: &Payment,
        product: Product,
        sale_id: Uuid,
    ) -> Result<Sale> {
        let (product, quantity) = self.take_stock(payment, product).await?;
        let mut sale = Sale::from_payment(payment, &product, quantity, Utc::now());
        sale.id = sale_id;
        if let Err(err) = self.sales.create(sale.clone()).await {
            if let Err(restock_err) = self.products.restock(&product.id, quantity).await {
                tracing::error!(
                    payment_id = %payment.id,
                    product_id = %product.id,
                    quantity,
                    error = %restock_err,
                    "could not return stock for an unrecorded sale"
                );
            }
            return Err(err);
        }
        Ok(sale)
    }

    async fn release_claim(&self, payment_id: Uuid, sale_id: Uuid) {
        match self.payments.unlink_sale(payment_id, sale_id).await {
            Ok(_) => {
                tracing::debug!(payment_id = %payment_id, sale_id = %sale_id, "sale claim released")
            }
            Err(err) => tracing::error!(
                payment_id = %payment_id,
                sale_id = %sale_id,
                error = %err,
                "could not release sale claim; payment points at a missing sale"
            ),
        }
    }

    async fn load_product(&self, product_id: &str) -> Result<Product> {
        self.products
            .get(product_id)
            .await?
            .ok_or_else(|| PaymentError::ProductNotFound(product_id.to_string()))
    }

    /// Deducts the resolved quantity, re-reading the product when a concurrent
    /// sale got there first. Returns the product as priced and the quantity taken.
    async fn take_stock(&self, payment: &Payment, mut product: Product) -> Result<(Product, u32)> {
        let mut last_error = None;
        for _ in 0..STOCK_ATTEMPTS {
            let quantity =
                resolve_quantity(payment.amount.value(), product.selling_price, product.stock);
            if quantity == 0 {
                break;
            }
            match self.products.decrement_stock(&product.id, quantity).await {
                Ok(_) => return Ok((product, quantity)),
                Err(err @ PaymentError::InsufficientStock { .. }) => {
                    last_error = Some(err);
                    product = self.load_product(&product.id).await?;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::error!(
            payment_id = %payment.id,
            product_id = %product.id,
            "stock ran out while reconciling a completed payment"
        );
        self.report_inventory_short(payment, &product.id);
        Err(last_error.unwrap_or(PaymentError::InsufficientStock {
            product_id: product.id.clone(),
            requested: 1,
            available: 0,
        }))
    }

    fn report_inventory_short(&self, payment: &Payment, product_id: &str) {
        tracing::warn!(
            payment_id = %payment.id,
            product_id = %product_id,
            amount = %payment.amount.value(),
            "payment completed but product is out of stock; no sale recorded"
        );
        self.emit(SaleEvent::InventoryShort {
            payment_id: payment.id,
            product_id: product_id.to_string(),
            amount: payment.amount.value(),
        });
    }

    fn emit(&self, event: SaleEvent) {
        if let Some(events) = &self.events
            && let Err(err) = events.try_send(event)
        {
            tracing::warn!("dropping sale event: {}", err);
        }
    }
}
