//! Shared handler state.

use std::sync::Arc;

use avgpay_core::{EnrichmentQueue, EntityRepository, MarketContextProvider};
use avgpay_inference::FallbackClient;
use avgpay_jobs::{Backfill, CronRunner, EnrichmentProcessor, EnrichmentTrigger, RecoverySweeper};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub queue: Arc<dyn EnrichmentQueue>,
    pub entities: Arc<dyn EntityRepository>,
    pub processor: Arc<EnrichmentProcessor>,
    pub sweeper: RecoverySweeper,
    pub trigger: EnrichmentTrigger,
    pub backfill: Backfill,
    pub cron: Arc<CronRunner>,
}

impl AppState {
    /// Wire the enrichment components over one set of stores.
    pub fn new(
        config: AppConfig,
        queue: Arc<dyn EnrichmentQueue>,
        entities: Arc<dyn EntityRepository>,
        market: Arc<dyn MarketContextProvider>,
        llm: Arc<FallbackClient>,
    ) -> Self {
        let processor = Arc::new(
            EnrichmentProcessor::new(queue.clone(), entities.clone(), market, llm)
                .with_config(config.processor.clone()),
        );
        let sweeper = RecoverySweeper::new(queue.clone()).with_config(config.sweeper.clone());
        let cron = CronRunner::new(processor.clone(), sweeper.clone()).with_budget(config.cron_budget);

        Self {
            trigger: EnrichmentTrigger::new(queue.clone(), entities.clone()),
            backfill: Backfill::new(queue.clone(), entities.clone()),
            config: Arc::new(config),
            queue,
            entities,
            processor,
            sweeper,
            cron: Arc::new(cron),
        }
    }
}
