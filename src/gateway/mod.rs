//! Gateway adapter layer
//!
//! Uniform request/response wrapper around the disbursement provider and
//! the identity-verification provider. Provider errors are normalized into
//! `GatewayError`; payload shapes are the closed typed variants in `types`.

pub mod adapter;
pub mod error;
pub mod http;
pub mod provider;
pub mod types;

pub use adapter::GatewayAdapter;
pub use error::{GatewayError, GatewayResult};
pub use provider::{HttpGatewayAdapter, ProviderRoutes};
