use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::metrics::record_judged_submission;
use crate::models::submission::{
    JudgeVerdict, NodeSubmissionResponse, SolutionResponse, SubmitNodeRequest,
    SubmitSolutionRequest, CORRECT_MESSAGE,
};
use crate::models::User;
use crate::services::attempt_service::AttemptService;
use crate::services::code_execution::{CodeExecutor, ExecutionOutput};
use crate::services::problem_service::ProblemService;
use crate::store::Store;

/// Compares executed output with the expected output. Only leading and
/// trailing whitespace is ignored.
pub fn judge_output(expected_output: &str, run: ExecutionOutput) -> JudgeVerdict {
    let expected = expected_output.trim();
    let actual = run.output.trim().to_string();
    let is_correct = actual == expected;

    let message = if is_correct {
        CORRECT_MESSAGE.to_string()
    } else {
        format!(
            "Incorrect. Expected:\n{}\n\nYour output:\n{}",
            expected, actual
        )
    };

    JudgeVerdict {
        is_correct,
        output: actual,
        stdout: run.stdout,
        stderr: run.stderr,
        message,
    }
}

pub struct JudgeService {
    store: Arc<dyn Store>,
    executor: Arc<dyn CodeExecutor>,
}

impl JudgeService {
    pub fn new(store: Arc<dyn Store>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self { store, executor }
    }

    /// Runs the code remotely and judges its output. Execution failures are
    /// returned as errors, never as an incorrect verdict.
    pub async fn judge(
        &self,
        expected_output: &str,
        code: &str,
        language: &str,
    ) -> AppResult<JudgeVerdict> {
        let run = self.executor.execute(code, language).await?;
        Ok(judge_output(expected_output, run))
    }

    /// Standalone problem submission, addressed by access code.
    pub async fn submit_solution(&self, req: SubmitSolutionRequest) -> AppResult<SolutionResponse> {
        let problems = ProblemService::new(self.store.clone());
        let problem = problems.get_by_access_code(&req.access_code).await?;

        let verdict = self
            .judge(&problem.expected_output, &req.code, &req.language)
            .await?;
        record_judged_submission("problem", verdict.is_correct);

        if verdict.is_correct {
            let completions = problems.increment_completions(&problem).await?;
            tracing::info!(
                "Problem {} solved ({} completions)",
                problem.id,
                completions
            );
        }

        Ok(SolutionResponse {
            verdict,
            ran: true,
            language: req.language.trim().to_lowercase(),
        })
    }

    /// Judges code for one node of the user's attempt and records the
    /// submission. No adventure lock is held while the code runs.
    pub async fn submit_node(
        &self,
        attempt_id: &str,
        req: SubmitNodeRequest,
        user: &User,
    ) -> AppResult<NodeSubmissionResponse> {
        let attempts = AttemptService::new(self.store.clone());
        let attempt = attempts.get_attempt(attempt_id, user).await?;
        if attempt.completed {
            return Err(AppError::validation("Attempt is already completed"));
        }

        let adventure = self
            .store
            .find_adventure(&attempt.adventure_id)
            .await?
            .ok_or_else(|| AppError::not_found("Adventure"))?;
        let node = adventure
            .graph
            .node(&req.node_id)
            .ok_or_else(|| AppError::not_found("Node"))?;

        let language = req
            .language
            .as_deref()
            .unwrap_or(node.data.language.as_str());
        let verdict = self
            .judge(&node.data.expected_output, &req.code, language)
            .await?;
        record_judged_submission("adventure_node", verdict.is_correct);

        let recorded = attempts
            .record_node_submission(
                &attempt,
                &req.node_id,
                &req.code,
                &verdict.output,
                verdict.is_correct,
            )
            .await?;

        tracing::info!(
            "Node {} of attempt {} judged (correct: {})",
            req.node_id,
            attempt.id,
            verdict.is_correct
        );

        Ok(NodeSubmissionResponse {
            verdict,
            submission_id: recorded.submission.id,
            current_node_id: recorded.attempt.current_node_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(output: &str) -> ExecutionOutput {
        ExecutionOutput {
            output: output.to_string(),
            stdout: output.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let verdict = judge_output("2\n", run("2\n"));
        assert!(verdict.is_correct);
        assert_eq!(verdict.output, "2");
        assert_eq!(verdict.message, CORRECT_MESSAGE);
    }

    #[test]
    fn mismatch_reports_both_outputs() {
        let verdict = judge_output("2\n", run("3"));
        assert!(!verdict.is_correct);
        assert!(verdict.message.contains("Expected:\n2"));
        assert!(verdict.message.contains("Your output:\n3"));
    }

    #[test]
    fn inner_whitespace_is_significant() {
        let verdict = judge_output("1 2", run("1  2"));
        assert!(!verdict.is_correct);
    }
}
