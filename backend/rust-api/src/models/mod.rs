use serde::{Deserialize, Serialize};

pub mod adventure;
pub mod attempt;
pub mod leaderboard;
pub mod problem;
pub mod submission;
pub mod user;

pub use adventure::{Adventure, AdventureStats, GraphData, GraphEdge, GraphNode};
pub use attempt::{AdventureAttempt, NodeOutcome, PathEntry, ProblemSubmission};
pub use leaderboard::{LeaderboardEntry, RankedEntry};
pub use problem::Problem;
pub use user::User;

/// Moderation state shared by problems and adventures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn initial(request_public: bool) -> Self {
        if request_public {
            ApprovalStatus::Pending
        } else {
            ApprovalStatus::Draft
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_status_depends_on_public_request() {
        assert_eq!(ApprovalStatus::initial(true), ApprovalStatus::Pending);
        assert_eq!(ApprovalStatus::initial(false), ApprovalStatus::Draft);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ApprovalStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
        assert_eq!(ApprovalStatus::Rejected.as_str(), "rejected");
    }
}
