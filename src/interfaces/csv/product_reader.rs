use crate::domain::product::Product;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads a product catalogue from a CSV source.
///
/// Expected header: `id, shop_id, name, selling_price, cost_price, stock`.
/// Whitespace around fields is trimmed.
pub struct ProductReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ProductReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one product per row.
    pub fn products(self) -> impl Iterator<Item = Result<Product>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
