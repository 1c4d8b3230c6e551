use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::Job;
use crate::model::tag::{self, clean_tag_value, Tag};
use crate::state::AppState;

/// Rewrites tag values into their cleaned form, merging into an existing tag when
/// the cleaned value is already taken.
pub struct CleanTagValues;

/// Tags whose stored value differs from the cleaned one, paired with the cleaned value.
pub fn dirty_tags(tags: &[Tag]) -> Vec<(&Tag, String)> {
    tags.iter()
        .filter_map(|t| {
            let cleaned = clean_tag_value(&t.tag_value);
            (cleaned != t.tag_value).then_some((t, cleaned))
        })
        .collect()
}

#[async_trait]
impl Job for CleanTagValues {
    fn name(&self) -> &'static str {
        "clean_tag_values"
    }

    fn every(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    async fn execute(&self, state: &AppState) -> anyhow::Result<()> {
        let mut tx = state.db.begin().await?;
        let tags = tag::all(&mut *tx).await?;

        let mut renamed = 0;
        let mut merged = 0;
        for (dirty, cleaned) in dirty_tags(&tags) {
            match tag::by_value(&mut *tx, &cleaned).await? {
                Some(existing) if existing.id != dirty.id => {
                    tag::merge(&mut *tx, dirty.id, existing.id).await?;
                    merged += 1;
                }
                _ => {
                    tag::set_value(&mut *tx, dirty.id, &cleaned).await?;
                    renamed += 1;
                }
            }
        }

        tx.commit().await?;
        if renamed + merged > 0 {
            info!(renamed, merged, "tag values cleaned");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unclean_values_are_selected() {
        let tags = vec![Tag::new(1, "cats"), Tag::new(1, "Funny Dogs!"), Tag::new(1, "ok")];
        let dirty = dirty_tags(&tags);
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].0.tag_value, "Funny Dogs!");
        assert_eq!(dirty[0].1, "funny dogs");
    }
}
