//! Auto-retrain tick (§4.10): a periodic check of how much new labeled
//! data has accumulated since the production model was trained, grounded
//! on the same `Arc<Self>` + `loop{...;sleep}` shape as `orchestrator`
//! and the teacher's `auto_scanner.rs`.

use crate::config::PipelineConfig;
use crate::db::repository;
use crate::error::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct RetrainRecommendation {
    pub new_recording_count: i64,
    pub threshold: i64,
}

pub struct RetrainMonitor {
    pool: PgPool,
    config: PipelineConfig,
}

impl RetrainMonitor {
    pub fn new(pool: PgPool, config: PipelineConfig) -> Self {
        Self { pool, config }
    }

    /// Runs forever at `retrain_tick_period_secs`. A failed tick is logged
    /// and the loop continues.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let period = Duration::from_secs(self.config.retrain_tick_period_secs);
        loop {
            tokio::time::sleep(period).await;
            match self.tick().await {
                Ok(Some(rec)) => info!(
                    new_recordings = rec.new_recording_count,
                    threshold = rec.threshold,
                    "retrain recommended"
                ),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "retrain tick failed"),
            }
        }
    }

    /// No production model means there's nothing to compare against, so
    /// the tick reports nothing rather than recommending an initial
    /// training run - that's a separate, explicitly-triggered action.
    pub async fn tick(&self) -> Result<Option<RetrainRecommendation>> {
        let Some(production) = repository::current_production_model(&self.pool).await? else {
            return Ok(None);
        };

        let new_recordings = repository::recordings_newer_than(&self.pool, production.created_at).await?;
        let count = new_recordings.len() as i64;

        if count >= self.config.retrain_min_new_recordings {
            Ok(Some(RetrainRecommendation {
                new_recording_count: count,
                threshold: self.config.retrain_min_new_recordings,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_matches_spec() {
        let config = PipelineConfig::default();
        assert_eq!(config.retrain_min_new_recordings, 20);
        assert_eq!(config.retrain_tick_period_secs, 3600);
    }
}
