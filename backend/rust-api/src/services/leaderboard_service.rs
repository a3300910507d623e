use std::sync::Arc;

use crate::error::AppResult;
use crate::models::leaderboard::{FastestCompletion, LeaderboardStanding};
use crate::models::adventure::millis_to_secs;
use crate::store::Store;

pub const DEFAULT_STANDINGS_LIMIT: u32 = 10;
pub const MAX_STANDINGS_LIMIT: u32 = 100;

/// Read-only projection over leaderboard entries; recomputed per query.
pub struct LeaderboardService {
    store: Arc<dyn Store>,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fastest timed completion of the adventure, with its holder's name.
    pub async fn fastest_for(&self, adventure_id: &str) -> AppResult<Option<FastestCompletion>> {
        let ranked = self.store.ranked_entries(adventure_id, 1).await?;

        Ok(ranked.into_iter().next().and_then(|r| {
            r.entry.completion_ms.map(|ms| FastestCompletion {
                completion_time: millis_to_secs(ms),
                user_id: r.entry.user_id,
                username: r.username,
            })
        }))
    }

    pub async fn standings(
        &self,
        adventure_id: &str,
        limit: Option<u32>,
    ) -> AppResult<Vec<LeaderboardStanding>> {
        let limit = limit
            .unwrap_or(DEFAULT_STANDINGS_LIMIT)
            .clamp(1, MAX_STANDINGS_LIMIT);

        let ranked = self
            .store
            .ranked_entries(adventure_id, limit as usize)
            .await?;

        Ok(ranked
            .into_iter()
            .filter_map(|r| {
                let ms = r.entry.completion_ms?;
                Some((r, ms))
            })
            .enumerate()
            .map(|(i, (r, ms))| LeaderboardStanding {
                rank: i + 1,
                user_id: r.entry.user_id,
                username: r.username,
                completion_time: millis_to_secs(ms),
                completed_at: r.entry.completed_at,
            })
            .collect())
    }
}
