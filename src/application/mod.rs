//! Application layer orchestrating the payment lifecycle.
//!
//! `PaymentEngine` wires the components below into a single entry point:
//! initiation, callback processing, reconciliation, retries, cancellation,
//! status checks and the expiry sweep.

pub mod callback;
pub mod cancel;
pub mod engine;
pub mod events;
pub mod initiator;
pub mod reaper;
pub mod reconciler;
pub mod retry;
pub mod status;
