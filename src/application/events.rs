use crate::domain::sale::Sale;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound notifications raised by reconciliation.
///
/// Delivery (webhooks, SMS, loyalty) happens downstream of the channel and can
/// never fail the payment that produced the event.
#[derive(Debug, Clone, PartialEq)]
pub enum SaleEvent {
    Recorded { sale: Sale, phone: String },
    /// Money was received but the product had no stock left to deduct.
    InventoryShort {
        payment_id: Uuid,
        product_id: String,
        amount: Decimal,
    },
}

pub type SaleEventSender = mpsc::Sender<SaleEvent>;
pub type SaleEventReceiver = mpsc::Receiver<SaleEvent>;

pub fn sale_event_channel(capacity: usize) -> (SaleEventSender, SaleEventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Drains the sale event channel until every sender is gone.
pub struct SaleEventWorker {
    receiver: SaleEventReceiver,
}

impl SaleEventWorker {
    pub fn new(receiver: SaleEventReceiver) -> Self {
        Self { receiver }
    }

    pub async fn run(mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.receiver.recv().await {
            match &event {
                SaleEvent::Recorded { sale, phone } => tracing::info!(
                    sale_id = %sale.id,
                    payment_id = %sale.payment_id,
                    product_id = %sale.product_id,
                    quantity = sale.quantity,
                    total = %sale.total_amount,
                    phone = %phone,
                    "sale recorded"
                ),
                SaleEvent::InventoryShort {
                    payment_id,
                    product_id,
                    amount,
                } => tracing::warn!(
                    payment_id = %payment_id,
                    product_id = %product_id,
                    amount = %amount,
                    "payment received for a product with no stock"
                ),
            }
            handled += 1;
        }
        handled
    }
}
