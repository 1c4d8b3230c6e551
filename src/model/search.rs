use std::collections::HashSet;

use anyhow::Context;
use rand::{seq::SliceRandom, Rng};
use sqlx::{FromRow, PgPool};

use crate::model::image::{self, Image};

/// An image id and its aggregate search score.
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct ImageSignature {
    pub id: i64,
    pub score: f64,
}

/// Picks `count` signatures, favouring higher scores. Returns the input
/// unchanged when it has no more than `count` items.
pub fn weighted_random<R: Rng + ?Sized>(
    mut items: Vec<ImageSignature>,
    count: usize,
    rng: &mut R,
) -> Vec<ImageSignature> {
    if count >= items.len() {
        return items;
    }

    let total: f64 = items.iter().map(|i| i.score).sum();
    items.shuffle(rng);

    let mut chosen = HashSet::with_capacity(count);
    let mut selected = Vec::with_capacity(count);
    while selected.len() < count {
        let r = rng.gen::<f64>() * total;
        let pick = items
            .iter()
            .find(|i| i.score > r && !chosen.contains(&i.id))
            .or_else(|| items.iter().find(|i| !chosen.contains(&i.id)));
        match pick {
            Some(i) => {
                chosen.insert(i.id);
                selected.push(*i);
            }
            None => break,
        }
    }
    selected
}

/// Images whose tags resemble `query`, scored by similarity times votes.
pub async fn search_images_internal(
    db: &PgPool,
    query: &str,
    exclude_uuids: &[String],
    rating_filter: i32,
) -> anyhow::Result<Vec<ImageSignature>> {
    sqlx::query_as::<_, ImageSignature>(
        r#"
        SELECT vs.image_id AS id, sum(ts.score * vs.votes_total)::float8 AS score
        FROM (
            SELECT t.id AS tag_id, similarity(t.tag_value, $1) AS score
            FROM tag t
            WHERE similarity(t.tag_value, $1) > show_limit()
        ) ts
            JOIN vote_summary vs ON vs.tag_id = ts.tag_id
            JOIN image i ON vs.image_id = i.id
        WHERE vs.votes_total > 0
            AND i.content_rating <= $2
            AND NOT (i.uuid = ANY($3))
        GROUP BY vs.image_id
        ORDER BY score DESC
        "#,
    )
    .bind(query)
    .bind(rating_filter)
    .bind(exclude_uuids)
    .fetch_all(db)
    .await
    .context("search images")
}

pub async fn search_images(db: &PgPool, query: &str, rating_filter: i32) -> anyhow::Result<Vec<Image>> {
    let hits = search_images_internal(db, query, &[], rating_filter).await?;
    let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
    image::load_ids(db, &ids).await
}

pub async fn search_images_weighted_random(
    db: &PgPool,
    query: &str,
    rating_filter: i32,
    count: usize,
) -> anyhow::Result<Vec<Image>> {
    let hits = search_images_internal(db, query, &[], rating_filter).await?;
    let picked = weighted_random(hits, count, &mut rand::thread_rng());
    let ids: Vec<i64> = picked.iter().map(|h| h.id).collect();
    image::load_ids(db, &ids).await
}

/// Only the hits tied for the best score.
pub fn best_scoring(hits: Vec<ImageSignature>) -> Vec<ImageSignature> {
    let best = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
    hits.into_iter().filter(|h| h.score == best).collect()
}

/// One image among those tied for the best score, used for chat searches.
pub async fn search_images_best_result(
    db: &PgPool,
    query: &str,
    exclude_uuids: &[String],
    rating_filter: i32,
) -> anyhow::Result<Option<Image>> {
    let hits = search_images_internal(db, query, exclude_uuids, rating_filter).await?;
    if hits.is_empty() {
        return Ok(None);
    }
    let picked = weighted_random(best_scoring(hits), 1, &mut rand::thread_rng());
    let ids: Vec<i64> = picked.iter().map(|h| h.id).collect();
    Ok(image::load_ids(db, &ids).await?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn sig(id: i64, score: f64) -> ImageSignature {
        ImageSignature { id, score }
    }

    #[test]
    fn returns_everything_when_count_covers_all() {
        let items = vec![sig(1, 1.0), sig(2, 2.0)];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(weighted_random(items.clone(), 2, &mut rng), items);
        assert_eq!(weighted_random(items.clone(), 5, &mut rng), items);
    }

    #[test]
    fn picks_distinct_items() {
        let items: Vec<_> = (1..=10).map(|i| sig(i, i as f64)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = weighted_random(items.clone(), 4, &mut rng);
            assert_eq!(picked.len(), 4);
            let ids: HashSet<_> = picked.iter().map(|p| p.id).collect();
            assert_eq!(ids.len(), 4);
        }
    }

    #[test]
    fn terminates_with_zero_scores() {
        let items = vec![sig(1, 0.0), sig(2, 0.0), sig(3, 0.0)];
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(weighted_random(items, 2, &mut rng).len(), 2);
    }

    #[test]
    fn heavy_items_win_most_draws() {
        let items = vec![sig(1, 100.0), sig(2, 0.5), sig(3, 0.5)];
        let mut rng = StdRng::seed_from_u64(11);
        let wins = (0..200)
            .filter(|_| weighted_random(items.clone(), 1, &mut rng)[0].id == 1)
            .count();
        assert!(wins > 150, "heavy item won {wins} of 200");
    }

    #[test]
    fn best_scoring_keeps_ties() {
        let hits = vec![sig(1, 3.0), sig(2, 1.0), sig(3, 3.0)];
        let best = best_scoring(hits);
        assert_eq!(best.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 3]);
    }
}
