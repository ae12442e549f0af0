use super::callback::CallbackProcessor;
use super::cancel::cancel_payment;
use super::events::SaleEventSender;
use super::initiator::{Initiation, PaymentInitiator, PaymentRequest};
use super::reaper::ExpiryReaper;
use super::reconciler::{Reconciliation, SaleReconciler};
use super::retry::RetryManager;
use super::status::StatusVerifier;
use crate::config::{GatewayConfig, PaymentSettings};
use crate::domain::payment::Payment;
use crate::domain::ports::{PaymentStoreRef, ProductStoreRef, SaleStoreRef};
use crate::error::{PaymentError, Result};
use crate::gateway::GatewayTransport;
use crate::gateway::token::TokenManager;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The storage backends the engine runs against.
#[derive(Clone)]
pub struct Stores {
    pub payments: PaymentStoreRef,
    pub products: ProductStoreRef,
    pub sales: SaleStoreRef,
}

/// The main entry point of the payment core.
///
/// Built once at startup; every component is an explicit instance owned here
/// and shared by reference. Initiations, callbacks, retries and status checks
/// run under a fixed number of worker permits so a slow gateway cannot tie up
/// unbounded work. The expiry sweep runs outside that pool on its own timer.
pub struct PaymentEngine {
    stores: Stores,
    initiator: Arc<PaymentInitiator>,
    callbacks: Arc<CallbackProcessor>,
    reconciler: Arc<SaleReconciler>,
    retries: RetryManager,
    verifier: StatusVerifier,
    reaper: ExpiryReaper,
    workers: Arc<Semaphore>,
}

impl PaymentEngine {
    /// Wires every component against `transport` and `stores`.
    ///
    /// # Arguments
    ///
    /// * `events` - Where reconciled sales are announced, if anywhere.
    pub fn new(
        gateway: GatewayConfig,
        settings: PaymentSettings,
        transport: Arc<dyn GatewayTransport>,
        stores: Stores,
        events: Option<SaleEventSender>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(
            transport.clone(),
            settings.token_safety_margin,
        ));

        let mut reconciler = SaleReconciler::new(
            stores.payments.clone(),
            stores.products.clone(),
            stores.sales.clone(),
        );
        if let Some(events) = events {
            reconciler = reconciler.with_events(events);
        }
        let reconciler = Arc::new(reconciler);

        let initiator = Arc::new(PaymentInitiator::new(
            gateway.clone(),
            settings.clone(),
            tokens.clone(),
            transport.clone(),
            stores.payments.clone(),
        ));
        let callbacks = Arc::new(CallbackProcessor::new(
            stores.payments.clone(),
            reconciler.clone(),
        ));
        let retries = RetryManager::new(
            stores.payments.clone(),
            initiator.clone(),
            settings.max_retries,
        );
        let verifier = StatusVerifier::new(
            gateway,
            tokens,
            transport,
            stores.payments.clone(),
            callbacks.clone(),
        );
        let reaper = ExpiryReaper::new(stores.payments.clone(), settings.reaper_interval);

        Self {
            stores,
            initiator,
            callbacks,
            reconciler,
            retries,
            verifier,
            reaper,
            workers: Arc::new(Semaphore::new(settings.worker_pool_size.max(1))),
        }
    }

    pub async fn initiate(&self, request: PaymentRequest) -> Result<Initiation> {
        let _permit = self.worker().await?;
        self.initiator.initiate(request).await
    }

    pub async fn process_callback(&self, raw: &[u8]) -> Result<Payment> {
        let _permit = self.worker().await?;
        self.callbacks.process_callback(raw).await
    }

    pub async fn retry_payment(&self, payment_id: Uuid) -> Result<Initiation> {
        let _permit = self.worker().await?;
        self.retries.retry_payment(payment_id).await
    }

    pub async fn verify_payment(&self, payment_id: Uuid) -> Result<Payment> {
        let _permit = self.worker().await?;
        self.verifier.verify(payment_id).await
    }

    pub async fn cancel_payment(
        &self,
        payment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Payment> {
        cancel_payment(&self.stores.payments, payment_id, reason).await
    }

    /// Re-runs reconciliation for a completed payment, e.g. after restocking
    /// a product that was short when the money arrived.
    pub async fn reconcile(&self, payment_id: Uuid) -> Result<Reconciliation> {
        let payment = self
            .stores
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;
        self.reconciler.reconcile(&payment).await
    }

    pub async fn sweep_expired(&self) -> Result<usize> {
        self.reaper.sweep().await
    }

    /// Starts the periodic expiry sweep on its own task.
    pub fn spawn_reaper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.reaper.clone().run(shutdown))
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    async fn worker(&self) -> Result<OwnedSemaphorePermit> {
        self.workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PaymentError::InternalError(Box::new(e)))
    }
}
