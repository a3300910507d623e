//! Attempt lifecycle per (user, adventure): NONE -> IN_PROGRESS -> COMPLETED.
//!
//! Every mutation runs inside one adventure unit of work, so the attempt
//! row, the aggregate counters and the leaderboard entry change together.
//! A unit that loses the adventure row to a concurrent writer is retried
//! from scratch.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::metrics::{record_attempt_event, STORE_CONFLICTS_TOTAL};
use crate::models::attempt::ProgressRequest;
use crate::models::{AdventureAttempt, LeaderboardEntry, ProblemSubmission, User};
use crate::store::{AdventureTx, Store};
use crate::utils::retry::{retry_async_if, RetryConfig};

const ATTEMPT: &str = "Adventure attempt";

fn retry_on_conflict(err: &AppError) -> bool {
    let conflict = err.is_conflict();
    if conflict {
        STORE_CONFLICTS_TOTAL.inc();
        tracing::warn!("Adventure row busy, retrying unit of work");
    }
    conflict
}

/// Result of recording a judged node submission.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub submission: ProblemSubmission,
    pub attempt: AdventureAttempt,
}

pub struct AttemptService {
    store: Arc<dyn Store>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn begin(&self, adventure_id: &str) -> AppResult<Box<dyn AdventureTx>> {
        self.store
            .begin(adventure_id)
            .await?
            .ok_or_else(|| AppError::not_found("Adventure"))
    }

    /// Returns the user's in-progress attempt, or starts a new one at the
    /// adventure's start node.
    pub async fn get_or_start(&self, adventure_id: &str, user: &User) -> AppResult<AdventureAttempt> {
        self.get_or_start_at(adventure_id, user, Utc::now()).await
    }

    pub(crate) async fn get_or_start_at(
        &self,
        adventure_id: &str,
        user: &User,
        now: DateTime<Utc>,
    ) -> AppResult<AdventureAttempt> {
        self.store.upsert_user(user).await?;

        retry_async_if(RetryConfig::aggressive(), retry_on_conflict, || {
            self.try_get_or_start(adventure_id, user, now)
        })
        .await
    }

    async fn try_get_or_start(
        &self,
        adventure_id: &str,
        user: &User,
        now: DateTime<Utc>,
    ) -> AppResult<AdventureAttempt> {
        let mut tx = self.begin(adventure_id).await?;

        if let Some(existing) = tx.find_open_attempt(&user.id).await? {
            tracing::debug!(
                "Resuming attempt {} of adventure {} for {}",
                existing.id,
                adventure_id,
                user.id
            );
            return Ok(existing);
        }

        let replay = tx.has_completed_attempt(&user.id, None).await?;
        let attempt = AdventureAttempt::begin(tx.adventure(), &user.id, now);
        tx.insert_attempt(&attempt).await?;

        if !replay {
            let mut stats = tx.adventure().stats.clone();
            stats.record_first_attempt();
            tx.save_stats(&stats).await?;
        }

        tx.commit().await?;

        record_attempt_event("started", !replay);
        tracing::info!(
            "Attempt {} started on adventure {} by {} (replay: {})",
            attempt.id,
            adventure_id,
            user.id,
            replay
        );
        Ok(attempt)
    }

    /// Appends a path entry and moves the attempt to `current_node_id`;
    /// with `completed` set, also closes the attempt, folds its duration
    /// into the adventure stats and writes one leaderboard entry.
    pub async fn record_progress(
        &self,
        attempt_id: &str,
        user: &User,
        req: ProgressRequest,
    ) -> AppResult<AdventureAttempt> {
        self.record_progress_at(attempt_id, user, req, Utc::now())
            .await
    }

    pub(crate) async fn record_progress_at(
        &self,
        attempt_id: &str,
        user: &User,
        req: ProgressRequest,
        now: DateTime<Utc>,
    ) -> AppResult<AdventureAttempt> {
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .filter(|a| a.is_owned_by(&user.id))
            .ok_or_else(|| AppError::not_found(ATTEMPT))?;

        retry_async_if(RetryConfig::aggressive(), retry_on_conflict, || {
            self.try_record_progress(&attempt.adventure_id, attempt_id, user, &req, now)
        })
        .await
    }

    async fn try_record_progress(
        &self,
        adventure_id: &str,
        attempt_id: &str,
        user: &User,
        req: &ProgressRequest,
        now: DateTime<Utc>,
    ) -> AppResult<AdventureAttempt> {
        let mut tx = self.begin(adventure_id).await?;

        let mut attempt = tx
            .find_attempt(attempt_id)
            .await?
            .filter(|a| a.is_owned_by(&user.id))
            .ok_or_else(|| AppError::not_found(ATTEMPT))?;

        if attempt.completed {
            return Err(AppError::validation("Attempt is already completed"));
        }
        if !tx.adventure().graph.contains_node(&req.current_node_id) {
            return Err(AppError::validation(format!(
                "Node {} is not part of this adventure",
                req.current_node_id
            )));
        }

        attempt.advance(&req.current_node_id, req.outcome, req.code.clone(), now);

        if !req.completed {
            tx.save_attempt(&attempt).await?;
            tx.commit().await?;
            tracing::debug!("Attempt {} moved to node {}", attempt.id, attempt.current_node_id);
            return Ok(attempt);
        }

        attempt.complete(now);
        tx.save_attempt(&attempt).await?;

        let first_completion = !tx
            .has_completed_attempt(&user.id, Some(attempt.id.as_str()))
            .await?;
        let durations = tx.completed_durations().await?;

        let mut stats = tx.adventure().stats.clone();
        stats.record_completion(attempt.duration_ms, first_completion, &durations);
        tx.save_stats(&stats).await?;

        tx.insert_leaderboard_entry(&LeaderboardEntry::for_attempt(&attempt))
            .await?;

        tx.commit().await?;

        record_attempt_event("completed", first_completion);
        tracing::info!(
            "Attempt {} completed adventure {} in {:?} ms (first completion: {})",
            attempt.id,
            adventure_id,
            attempt.duration_ms,
            first_completion
        );
        Ok(attempt)
    }

    /// Persists a judged node submission and records it on the attempt's path.
    pub async fn record_node_submission(
        &self,
        attempt: &AdventureAttempt,
        node_id: &str,
        code: &str,
        output: &str,
        is_correct: bool,
    ) -> AppResult<RecordedSubmission> {
        self.record_node_submission_at(attempt, node_id, code, output, is_correct, Utc::now())
            .await
    }

    pub(crate) async fn record_node_submission_at(
        &self,
        attempt: &AdventureAttempt,
        node_id: &str,
        code: &str,
        output: &str,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> AppResult<RecordedSubmission> {
        retry_async_if(RetryConfig::aggressive(), retry_on_conflict, || async {
            let mut tx = self.begin(&attempt.adventure_id).await?;

            let mut current = tx
                .find_attempt(&attempt.id)
                .await?
                .ok_or_else(|| AppError::not_found(ATTEMPT))?;
            if current.completed {
                return Err(AppError::validation("Attempt is already completed"));
            }

            let submission =
                ProblemSubmission::new(&current.id, node_id, code, output, is_correct, now);
            tx.insert_submission(&submission).await?;

            current.record_submission(node_id, is_correct, now);
            tx.save_attempt(&current).await?;
            tx.commit().await?;

            Ok(RecordedSubmission {
                submission,
                attempt: current,
            })
        })
        .await
    }

    pub async fn get_attempt(&self, attempt_id: &str, user: &User) -> AppResult<AdventureAttempt> {
        let attempt = self
            .store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::not_found(ATTEMPT))?;

        if !attempt.is_owned_by(&user.id) {
            tracing::warn!(
                "User {} tried to read attempt {} owned by {}",
                user.id,
                attempt.id,
                attempt.user_id
            );
            return Err(AppError::forbidden("You can only view your own attempts"));
        }
        Ok(attempt)
    }

    pub async fn list_attempts(
        &self,
        user: &User,
        adventure_id: Option<&str>,
    ) -> AppResult<Vec<AdventureAttempt>> {
        Ok(self.store.list_attempts(&user.id, adventure_id).await?)
    }

    pub async fn list_submissions(
        &self,
        attempt_id: &str,
        user: &User,
    ) -> AppResult<Vec<ProblemSubmission>> {
        let attempt = self.get_attempt(attempt_id, user).await?;
        Ok(self.store.list_submissions(&attempt.id).await?)
    }
}
