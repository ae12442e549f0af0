use super::payment::Payment;
use super::product::Product;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Mpesa,
}

/// A sale recorded from a completed payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub shop_id: String,
    pub product_id: String,
    pub payment_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub cost_amount: Decimal,
    pub profit: Decimal,
    pub payment_method: PaymentMethod,
    pub receipt_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Prices `quantity` units of `product` at its current unit economics.
    pub fn from_payment(
        payment: &Payment,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let units = Decimal::from(quantity);
        let total_amount = product.selling_price * units;
        let cost_amount = product.cost_price * units;
        Self {
            id: Uuid::new_v4(),
            shop_id: payment.shop_id.clone(),
            product_id: product.id.clone(),
            payment_id: payment.id,
            quantity,
            unit_price: product.selling_price,
            total_amount,
            cost_amount,
            profit: total_amount - cost_amount,
            payment_method: PaymentMethod::Mpesa,
            receipt_number: payment.receipt_number.clone(),
            created_at: now,
        }
    }
}

/// Infers how many units a payment bought.
///
/// One unit unless the payer sent at least twice the unit price, in which case
/// the whole number of units the amount covers. Never more than `stock`.
/// This cannot tell "paid for three" from "overpaid for one"; that is a
/// business policy, kept as is.
pub fn resolve_quantity(amount: Decimal, unit_price: Decimal, stock: u32) -> u32 {
    let inferred = if unit_price > Decimal::ZERO && amount >= unit_price * Decimal::TWO {
        (amount / unit_price).floor().to_u32().unwrap_or(u32::MAX)
    } else {
        1
    };
    inferred.min(stock)
}
