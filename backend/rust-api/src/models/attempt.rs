use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::adventure::Adventure;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    Started,
    Correct,
    Incorrect,
    Completed,
}

impl NodeOutcome {
    pub fn from_correctness(is_correct: bool) -> Self {
        if is_correct {
            NodeOutcome::Correct
        } else {
            NodeOutcome::Incorrect
        }
    }
}

/// One step of a traversal. `path_taken` is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathEntry {
    pub node_id: String,
    pub outcome: NodeOutcome,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdventureAttempt {
    pub id: String,
    pub adventure_id: String,
    pub user_id: String,
    pub start_node_id: String,
    pub current_node_id: String,
    pub path_taken: Vec<PathEntry>,
    pub completed: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl AdventureAttempt {
    /// New in-progress attempt rooted at the adventure's start node.
    /// Timestamps are kept at millisecond precision so the stored duration
    /// is exactly `end_time - start_time`.
    pub fn begin(adventure: &Adventure, user_id: &str, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(3);
        Self {
            id: Uuid::new_v4().to_string(),
            adventure_id: adventure.id.clone(),
            user_id: user_id.to_string(),
            start_node_id: adventure.start_node_id.clone(),
            current_node_id: adventure.start_node_id.clone(),
            path_taken: vec![PathEntry {
                node_id: adventure.start_node_id.clone(),
                outcome: NodeOutcome::Started,
                timestamp: now,
                code: None,
            }],
            completed: false,
            start_time: Some(now),
            end_time: None,
            duration_ms: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        !self.completed
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Records the outcome at the current node, then moves to `next_node_id`.
    pub fn advance(
        &mut self,
        next_node_id: &str,
        outcome: NodeOutcome,
        code: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.path_taken.push(PathEntry {
            node_id: self.current_node_id.clone(),
            outcome,
            timestamp: now,
            code,
        });
        self.current_node_id = next_node_id.to_string();
    }

    /// Records a judged submission at `node_id` and makes it the current node.
    pub fn record_submission(&mut self, node_id: &str, is_correct: bool, now: DateTime<Utc>) {
        self.path_taken.push(PathEntry {
            node_id: node_id.to_string(),
            outcome: NodeOutcome::from_correctness(is_correct),
            timestamp: now,
            code: None,
        });
        self.current_node_id = node_id.to_string();
    }

    /// Marks the attempt completed. The duration is set only when a start
    /// time is known, and never goes negative.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        let now = now.trunc_subsecs(3);
        self.completed = true;
        self.end_time = Some(now);
        self.duration_ms = self
            .start_time
            .map(|start| (now - start).num_milliseconds().max(0));
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_ms.map(super::adventure::millis_to_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRequest {
    pub current_node_id: String,
    pub outcome: NodeOutcome,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttemptsQuery {
    pub adventure_id: Option<String>,
}

/// Judged submission for one node of an attempt. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemSubmission {
    pub id: String,
    pub attempt_id: String,
    pub node_id: String,
    pub code_submitted: String,
    pub output: String,
    pub is_correct: bool,
    pub created_at: DateTime<Utc>,
}

impl ProblemSubmission {
    pub fn new(
        attempt_id: &str,
        node_id: &str,
        code: &str,
        output: &str,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            node_id: node_id.to_string(),
            code_submitted: code.to_string(),
            output: output.to_string(),
            is_correct,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::adventure::{AdventureStats, GraphData};
    use crate::models::ApprovalStatus;
    use chrono::Duration;

    fn adventure() -> Adventure {
        Adventure {
            id: "adv-1".to_string(),
            name: "Loops".to_string(),
            description: None,
            creator_id: "author".to_string(),
            created_at: Utc::now(),
            graph: GraphData::default(),
            start_node_id: "a".to_string(),
            end_node_id: "c".to_string(),
            is_public: false,
            approval_status: ApprovalStatus::Draft,
            approval_requested_at: None,
            approved_at: None,
            approved_by: None,
            access_code: "abc123".to_string(),
            stats: AdventureStats::default(),
        }
    }

    #[test]
    fn begin_seeds_started_entry_at_start_node() {
        let now = Utc::now();
        let attempt = AdventureAttempt::begin(&adventure(), "u1", now);

        assert_eq!(attempt.current_node_id, "a");
        assert_eq!(attempt.path_taken.len(), 1);
        assert_eq!(attempt.path_taken[0].outcome, NodeOutcome::Started);
        assert_eq!(attempt.start_time, Some(now.trunc_subsecs(3)));
        assert!(attempt.is_in_progress());
    }

    #[test]
    fn advance_records_node_being_left() {
        let now = Utc::now();
        let mut attempt = AdventureAttempt::begin(&adventure(), "u1", now);
        attempt.advance("b", NodeOutcome::Correct, Some("print(1)".into()), now);

        let last = attempt.path_taken.last().unwrap();
        assert_eq!(last.node_id, "a");
        assert_eq!(last.code.as_deref(), Some("print(1)"));
        assert_eq!(attempt.current_node_id, "b");
    }

    #[test]
    fn complete_sets_exact_duration() {
        let start = Utc::now().trunc_subsecs(3);
        let mut attempt = AdventureAttempt::begin(&adventure(), "u1", start);
        let end = start + Duration::milliseconds(93_250);
        attempt.complete(end);

        assert!(attempt.completed);
        assert_eq!(attempt.end_time, Some(end));
        assert_eq!(attempt.duration_ms, Some(93_250));
        assert_eq!(attempt.duration_secs(), Some(93.25));
    }

    #[test]
    fn sub_millisecond_clock_still_yields_exact_duration() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T10:00:00.000600Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut attempt = AdventureAttempt::begin(&adventure(), "u1", start);
        attempt.complete(start + Duration::microseconds(1_999));

        let elapsed = attempt.end_time.unwrap() - attempt.start_time.unwrap();
        assert_eq!(attempt.duration_ms, Some(elapsed.num_milliseconds()));
        assert_eq!(elapsed, Duration::milliseconds(2));
        assert_eq!(attempt.path_taken[0].timestamp, attempt.start_time.unwrap());
    }

    #[test]
    fn complete_without_start_time_leaves_duration_unset() {
        let mut attempt = AdventureAttempt::begin(&adventure(), "u1", Utc::now());
        attempt.start_time = None;
        attempt.complete(Utc::now());

        assert!(attempt.completed);
        assert_eq!(attempt.duration_ms, None);
    }

    #[test]
    fn clock_skew_never_yields_negative_duration() {
        let start = Utc::now();
        let mut attempt = AdventureAttempt::begin(&adventure(), "u1", start);
        attempt.complete(start - Duration::seconds(5));

        assert_eq!(attempt.duration_ms, Some(0));
    }
}
