//! Domain types for STK push payments and the storage ports they depend on.

pub mod callback;
pub mod payment;
pub mod phone;
pub mod ports;
pub mod product;
pub mod sale;
