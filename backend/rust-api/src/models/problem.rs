use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ApprovalStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    pub id: String,
    pub access_code: String,
    pub title: String,
    pub description: String,
    pub code_snippet: String,
    pub expected_output: String,
    pub language: String,
    pub is_public: bool,
    pub approval_status: ApprovalStatus,
    pub completions: i64,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProblemRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters"
    ))]
    pub title: String,

    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    #[serde(default)]
    pub code_snippet: String,

    #[validate(length(min = 1, message = "Expected output is required"))]
    pub expected_output: String,

    #[validate(length(min = 1, max = 32, message = "Language is required"))]
    pub language: String,

    #[serde(default)]
    pub is_public: bool,
}
