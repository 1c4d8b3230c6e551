use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::Job;
use crate::model::tag;
use crate::state::AppState;

/// Drops tags that no image links to.
pub struct DeleteOrphanedTags;

#[async_trait]
impl Job for DeleteOrphanedTags {
    fn name(&self) -> &'static str {
        "delete_orphaned_tags"
    }

    fn every(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn execute(&self, state: &AppState) -> anyhow::Result<()> {
        let mut tx = state.db.begin().await?;
        let deleted = tag::delete_orphaned(&mut *tx).await?;
        tx.commit().await?;
        if deleted > 0 {
            info!(deleted, "orphaned tags deleted");
        }
        Ok(())
    }
}
