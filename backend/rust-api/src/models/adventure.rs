use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ApprovalStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// Exercise embedded in a graph node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeProblem {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub code_snippet: String,
    pub expected_output: String,
    pub language: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub position: NodePosition,
    pub data: NodeProblem,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node(node_id).is_some()
    }
}

/// Aggregate counters shared by every player of an adventure.
/// Only mutated inside an adventure unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdventureStats {
    pub total_attempts: i64,
    pub total_completions: i64,
    pub best_completion_ms: Option<i64>,
    pub avg_completion_ms: Option<f64>,
}

impl AdventureStats {
    pub fn record_first_attempt(&mut self) {
        self.total_attempts += 1;
    }

    /// Folds one completed attempt into the aggregate.
    ///
    /// `completed_durations` holds the durations of every completed attempt
    /// of the adventure, the new one included; the average is recomputed
    /// from it rather than adjusted incrementally.
    pub fn record_completion(
        &mut self,
        duration_ms: Option<i64>,
        first_completion: bool,
        completed_durations: &[i64],
    ) {
        if first_completion {
            self.total_completions += 1;
        }

        let Some(duration_ms) = duration_ms else {
            return;
        };

        self.best_completion_ms = Some(match self.best_completion_ms {
            Some(best) => best.min(duration_ms),
            None => duration_ms,
        });

        if !completed_durations.is_empty() {
            let total: f64 = completed_durations.iter().map(|d| *d as f64).sum();
            self.avg_completion_ms = Some(total / completed_durations.len() as f64);
        }
    }

    pub fn best_completion_secs(&self) -> Option<f64> {
        self.best_completion_ms.map(millis_to_secs)
    }

    pub fn avg_completion_secs(&self) -> Option<f64> {
        self.avg_completion_ms.map(|ms| ms / 1000.0)
    }
}

pub fn millis_to_secs(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Adventure {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub graph: GraphData,
    pub start_node_id: String,
    pub end_node_id: String,
    pub is_public: bool,
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub approval_requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    pub access_code: String,
    #[serde(default)]
    pub stats: AdventureStats,
}

impl Adventure {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn is_listed(&self) -> bool {
        self.is_public && self.approval_status == ApprovalStatus::Approved
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAdventureRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Name must be between 1 and 200 characters"
    ))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[serde(alias = "graph_data")]
    pub graph: GraphData,

    #[serde(default)]
    pub request_public: bool,
}

/// Partial update: only supplied fields change.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAdventureRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Name must be between 1 and 200 characters"
    ))]
    pub name: Option<String>,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[serde(default, alias = "graph_data")]
    pub graph: Option<GraphData>,

    pub request_public: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewAdventureRequest {
    pub decision: ReviewDecision,
}

/// Public listing row, enriched with the fastest leaderboard entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdventureSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
    pub approval_status: ApprovalStatus,
    pub total_attempts: i64,
    pub total_completions: i64,
    pub access_code: String,
    pub start_node_id: String,
    pub end_node_id: String,
    pub best_completion_time: Option<f64>,
    pub best_completion_user: Option<String>,
}

impl From<&Adventure> for AdventureSummary {
    fn from(adventure: &Adventure) -> Self {
        AdventureSummary {
            id: adventure.id.clone(),
            name: adventure.name.clone(),
            description: adventure.description.clone(),
            creator_id: adventure.creator_id.clone(),
            created_at: adventure.created_at,
            is_public: adventure.is_public,
            approval_status: adventure.approval_status,
            total_attempts: adventure.stats.total_attempts,
            total_completions: adventure.stats.total_completions,
            access_code: adventure.access_code.clone(),
            start_node_id: adventure.start_node_id.clone(),
            end_node_id: adventure.end_node_id.clone(),
            best_completion_time: None, // filled from the leaderboard
            best_completion_user: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicAdventuresResponse {
    pub adventures: Vec<AdventureSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_completion_sets_best_and_average() {
        let mut stats = AdventureStats::default();
        stats.record_completion(Some(90_000), true, &[90_000]);

        assert_eq!(stats.total_completions, 1);
        assert_eq!(stats.best_completion_ms, Some(90_000));
        assert_eq!(stats.avg_completion_ms, Some(90_000.0));
        assert_eq!(stats.best_completion_secs(), Some(90.0));
    }

    #[test]
    fn repeat_completion_keeps_counter_but_updates_times() {
        let mut stats = AdventureStats {
            total_attempts: 1,
            total_completions: 1,
            best_completion_ms: Some(90_000),
            avg_completion_ms: Some(90_000.0),
        };

        stats.record_completion(Some(30_000), false, &[90_000, 30_000]);

        assert_eq!(stats.total_completions, 1);
        assert_eq!(stats.best_completion_ms, Some(30_000));
        assert_eq!(stats.avg_completion_ms, Some(60_000.0));
    }

    #[test]
    fn slower_completion_does_not_replace_best() {
        let mut stats = AdventureStats {
            best_completion_ms: Some(10_000),
            ..Default::default()
        };

        stats.record_completion(Some(50_000), true, &[10_000, 50_000]);

        assert_eq!(stats.best_completion_ms, Some(10_000));
        assert_eq!(stats.avg_completion_ms, Some(30_000.0));
    }

    #[test]
    fn missing_duration_only_counts_completion() {
        let mut stats = AdventureStats::default();
        stats.record_completion(None, true, &[]);

        assert_eq!(stats.total_completions, 1);
        assert_eq!(stats.best_completion_ms, None);
        assert_eq!(stats.avg_completion_ms, None);
    }

    #[test]
    fn edge_type_field_round_trips_as_type() {
        let edge: GraphEdge = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "source": "a",
            "target": "b",
            "type": "custom"
        }))
        .unwrap();

        assert_eq!(edge.kind.as_deref(), Some("custom"));
        assert!(edge.data.is_empty());
        let back = serde_json::to_value(&edge).unwrap();
        assert_eq!(back["type"], "custom");
    }
}
