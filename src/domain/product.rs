use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An item in a shop's catalogue, as far as reconciliation needs to know it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    pub selling_price: Decimal,
    pub cost_price: Decimal,
    pub stock: u32,
}

impl Product {
    pub fn is_out_of_stock(&self) -> bool {
        self.stock == 0
    }
}
