//! # avgpay-core
//!
//! Core types, traits, and abstractions for the AvgPay enrichment service.
//!
//! Every other `avgpay-*` crate depends on this one for the shared error
//! type, the enrichment job model, and the repository/backend traits that
//! let the processor run against Postgres in production and in-memory
//! fakes in tests.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod market;
pub mod models;
pub mod traits;
pub mod trigger;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use market::MarketStats;
pub use models::*;
pub use traits::*;
pub use trigger::{should_trigger_enrichment, trigger_reason, TriggerInput, TriggerReason};
