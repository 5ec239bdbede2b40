//! # avgpay-jobs
//!
//! The enrichment pipeline built on the `avgpay-core` traits.
//!
//! This crate provides:
//! - [`EnrichmentProcessor`]: claims a job, prompts the model chain, applies
//!   the per-entity quality gate and writes analysis back
//! - [`RecoverySweeper`]: fixed-window revival of failed jobs and requeue of
//!   stalled ones
//! - [`EnrichmentTrigger`]: fire-and-forget enqueue from page handlers
//! - [`Backfill`]: bulk enqueue of missing or stale analysis
//! - [`CronRunner`]: one scheduled pass of sweep plus process
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use avgpay_db::Database;
//! use avgpay_inference::{ChainConfig, FallbackClient};
//! use avgpay_jobs::{EnrichmentProcessor, ProcessorConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let llm = FallbackClient::from_config(&ChainConfig::from_env()?)?;
//! let processor = EnrichmentProcessor::new(
//!     Arc::new(db.queue.clone()),
//!     Arc::new(db.entities.clone()),
//!     Arc::new(db.market.clone()),
//!     Arc::new(llm),
//! )
//! .with_config(ProcessorConfig::from_env());
//!
//! let outcome = processor.process_next().await?;
//! println!("processed: {}", outcome.processed);
//! ```

pub mod analysis;
pub mod backfill;
pub mod cron;
pub mod processor;
pub mod prompts;
pub mod quality;
pub mod sweeper;
pub mod trigger;

// Re-export core types
pub use avgpay_core::*;

pub use backfill::{Backfill, BackfillSummary, QueuedCounts};
pub use cron::{CronRunner, CronSummary};
pub use processor::{
    EnrichmentEvent, EnrichmentProcessor, ProcessAllSummary, ProcessOutcome, ProcessorConfig,
    StopReason,
};
pub use quality::{check_quality, required_keys};
pub use sweeper::{RecoverySweeper, SweeperConfig};
pub use trigger::EnrichmentTrigger;
