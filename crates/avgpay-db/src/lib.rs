//! # avgpay-db
//!
//! PostgreSQL persistence for the enrichment pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgEnrichmentQueue`]: the enrichment job queue (atomic de-duplicated
//!   enqueue, `FOR UPDATE SKIP LOCKED` claim, failure recovery)
//! - [`PgEntityRepository`]: analysis read/write on companies, cities and job titles
//! - [`PgMarketContext`]: percentile summaries over salary submissions
//! - [`MemoryStore`]: an in-memory implementation of the same traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use avgpay_db::{Database, EnrichmentQueue, EntityType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/avgpay").await?;
//!     let job_id = db
//!         .queue
//!         .queue_enrichment(EntityType::Company, company_id, "Acme", None)
//!         .await?;
//!     println!("queued: {:?}", job_id);
//!     Ok(())
//! }
//! ```

pub mod entities;
pub mod market;
pub mod memory;
pub mod pool;
pub mod queue;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use avgpay_core::*;

pub use entities::PgEntityRepository;
pub use market::PgMarketContext;
pub use memory::MemoryStore;
pub use pool::{create_pool, log_pool_metrics, PoolConfig, PoolMetrics};
pub use queue::PgEnrichmentQueue;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Enrichment job queue.
    pub queue: PgEnrichmentQueue,
    /// Company, city and job-title rows.
    pub entities: PgEntityRepository,
    /// Market statistics for prompts.
    pub market: PgMarketContext,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            queue: PgEnrichmentQueue::new(pool.clone()),
            entities: PgEntityRepository::new(pool.clone()),
            market: PgMarketContext::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url, &PoolConfig::default()).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
