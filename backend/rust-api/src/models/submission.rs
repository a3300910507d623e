use serde::{Deserialize, Serialize};

pub const CORRECT_MESSAGE: &str = "Correct! Well done.";

/// Standalone problem submission, addressed by access code.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitSolutionRequest {
    pub access_code: String,
    pub code: String,
    pub language: String,
}

/// Submission for one node of an adventure attempt. The language defaults
/// to the one the node's problem was authored in.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitNodeRequest {
    pub node_id: String,
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeVerdict {
    pub is_correct: bool,
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionResponse {
    #[serde(flatten)]
    pub verdict: JudgeVerdict,
    pub ran: bool,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSubmissionResponse {
    #[serde(flatten)]
    pub verdict: JudgeVerdict,
    pub submission_id: String,
    pub current_node_id: String,
}
