use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use super::Job;
use crate::model::image;
use crate::state::AppState;

/// Backfills `file_size` by downloading images that never recorded one.
pub struct FixImageSizes;

#[async_trait]
impl Job for FixImageSizes {
    fn name(&self) -> &'static str {
        "fix_image_sizes"
    }

    fn every(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    async fn execute(&self, state: &AppState) -> anyhow::Result<()> {
        let ids = image::ids_with_zero_file_size(&state.db).await?;
        let mut fixed = 0;
        for id in ids {
            let Some(found) = image::by_id_plain(&state.db, id).await? else {
                continue;
            };
            let Some(url) = found.s3_read_url.as_deref() else {
                warn!(image_id = id, "image has no read url");
                continue;
            };
            let fetched = state.fetcher.fetch(url).await?;
            if fetched.status != 200 {
                anyhow::bail!("fetching image {} returned {}", found.uuid, fetched.status);
            }
            let size = i32::try_from(fetched.body.len()).context("image too large")?;
            image::update_file_size(&state.db, id, size).await?;
            fixed += 1;
        }
        if fixed > 0 {
            info!(fixed, "image sizes fixed");
        }
        Ok(())
    }
}
