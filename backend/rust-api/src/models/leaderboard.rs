use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::adventure::millis_to_secs;
use super::attempt::AdventureAttempt;

/// Timing fact for one completed attempt. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub id: String,
    pub adventure_id: String,
    pub user_id: String,
    pub completion_ms: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Completion time in seconds; lower is better.
    pub score: f64,
}

impl LeaderboardEntry {
    pub fn for_attempt(attempt: &AdventureAttempt) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            adventure_id: attempt.adventure_id.clone(),
            user_id: attempt.user_id.clone(),
            completion_ms: attempt.duration_ms,
            completed_at: attempt.end_time,
            score: attempt.duration_ms.map(millis_to_secs).unwrap_or(0.0),
        }
    }
}

/// Leaderboard entry joined to its owner's display name.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub entry: LeaderboardEntry,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FastestCompletion {
    pub completion_time: f64,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardStanding {
    pub rank: usize,
    pub user_id: String,
    pub username: String,
    pub completion_time: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StandingsQuery {
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::{NodeOutcome, PathEntry};

    #[test]
    fn score_is_duration_in_seconds() {
        let end = Utc::now();
        let attempt = AdventureAttempt {
            id: "att".into(),
            adventure_id: "adv".into(),
            user_id: "u1".into(),
            start_node_id: "a".into(),
            current_node_id: "c".into(),
            path_taken: vec![PathEntry {
                node_id: "a".into(),
                outcome: NodeOutcome::Started,
                timestamp: end,
                code: None,
            }],
            completed: true,
            start_time: None,
            end_time: Some(end),
            duration_ms: Some(42_500),
        };

        let entry = LeaderboardEntry::for_attempt(&attempt);
        assert_eq!(entry.score, 42.5);
        assert_eq!(entry.completion_ms, Some(42_500));
        assert_eq!(entry.completed_at, Some(end));
        assert_eq!(entry.user_id, "u1");
    }
}
