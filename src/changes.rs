use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::api::Api;
use crate::error::{Error, Result};
use crate::model::{Deal, PipelineChangeResult, Stage};
use crate::pool::FanOutPool;
use crate::reconstruct::reconstruct;

impl Api {
    /// Fetch every deal's update history on the worker pool and rebuild its
    /// phase transitions. Deals that never changed phase are omitted; result
    /// order is unspecified. Any failure yields the first error observed.
    #[instrument(skip_all, fields(deals = deals.len()))]
    pub async fn fetch_pipeline_changes(
        &self,
        deals: Vec<Deal>,
        stages: &[Stage],
    ) -> Result<Vec<PipelineChangeResult>> {
        if stages.is_empty() {
            return Err(Error::InvalidInput("pipeline has no stages".into()));
        }
        let stages: Arc<[Stage]> = stages.into();
        let pool = FanOutPool::new(self.config().workers())
            .with_policy(self.config().error_policy());
        debug!(workers = pool.workers(), "starting fetch pool");

        let api = self.clone();
        let outcome = pool
            .run(deals, move |deal: Deal, cancel| {
                let api = api.clone();
                let stages = Arc::clone(&stages);
                async move {
                    let updates = api.fetch_deal_updates_with(deal.id, cancel).await?;
                    reconstruct(deal, updates, &stages)
                }
            })
            .await;

        info!(
            changed = outcome.results.len(),
            failed = outcome.first_error.is_some(),
            "pipeline changes fetched"
        );
        outcome.into_result()
    }
}
