//! Refundflow backend library
//!
//! Core engine for ticketing-platform refund disbursements: the refund
//! lifecycle state machine, disbursement payload and idempotency-key
//! generation, webhook reconciliation with terminal-vs-transient failure
//! classification, the periodic retry sweep, and the bank-account
//! validation cache-and-poll engine.

pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod gateway;
pub mod services;
pub mod settings;
pub mod signer;
pub mod sync;
pub mod workers;
