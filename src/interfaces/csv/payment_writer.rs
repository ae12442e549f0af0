use crate::domain::payment::Payment;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

/// One line of the payment audit export.
#[derive(Debug, Serialize)]
struct PaymentRow<'a> {
    id: Uuid,
    shop_id: &'a str,
    product_id: Option<&'a str>,
    amount: Decimal,
    phone: &'a str,
    status: &'static str,
    failure_reason: Option<&'a str>,
    retry_count: u32,
    parent_payment_id: Option<Uuid>,
    checkout_request_id: Option<&'a str>,
    receipt_number: Option<&'a str>,
    sale_id: Option<Uuid>,
    created_at: String,
    completed_at: Option<String>,
}

impl<'a> From<&'a Payment> for PaymentRow<'a> {
    fn from(p: &'a Payment) -> Self {
        Self {
            id: p.id,
            shop_id: &p.shop_id,
            product_id: p.product_id.as_deref(),
            amount: p.amount.value().normalize(),
            phone: &p.phone,
            status: p.status.as_str(),
            failure_reason: p.failure_reason.as_deref(),
            retry_count: p.retry_count,
            parent_payment_id: p.parent_payment_id,
            checkout_request_id: p.checkout_request_id.as_deref(),
            receipt_number: p.receipt_number.as_deref(),
            sale_id: p.sale_id,
            created_at: timestamp(p.created_at),
            completed_at: p.completed_at.map(timestamp),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Writes payment records as CSV for reconciliation with gateway statements.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a, I>(&mut self, payments: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Payment>,
    {
        for payment in payments {
            self.writer.serialize(PaymentRow::from(payment))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Amount, NewPayment};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_terminal_fields() {
        let now = Utc::now();
        let mut payment = Payment::new(
            NewPayment {
                shop_id: "shop-1".to_string(),
                product_id: None,
                amount: Amount::new(dec!(100.00), dec!(150000)).unwrap(),
                phone: "254712345678".to_string(),
                account_reference: "shop-1".to_string(),
                description: "Payment".to_string(),
                parent_payment_id: None,
                retry_count: 0,
            },
            now,
            Duration::minutes(5),
        );
        payment.complete("QKX12345".to_string(), None, now).unwrap();

        let mut out = Vec::new();
        PaymentWriter::new(&mut out)
            .write_payments([&payment])
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("id,shop_id,product_id,amount,phone,status,"));
        assert!(text.contains(",100,254712345678,completed,"));
        assert!(text.contains("QKX12345"));
    }
}
