//! Gateway client implementations
//!
//! Concrete implementations of the GatewayClient trait.

pub mod nuvei;

pub use nuvei::NuveiClient;
