//! Persistence boundary.
//!
//! Entities reference each other by id only; relationships are resolved by
//! lookups through the store. Every write that touches an adventure's
//! aggregate counters goes through an [`AdventureTx`], which holds the
//! adventure row lock until it is committed or dropped.

use async_trait::async_trait;

use crate::models::{
    Adventure, AdventureAttempt, AdventureStats, LeaderboardEntry, Problem, ProblemSubmission,
    RankedEntry, User,
};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another writer holds the adventure row; the unit of work may be retried.
    #[error("write conflict on adventure row")]
    Conflict,

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if err.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
            return StoreError::Conflict;
        }

        if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(
            ref we,
        )) = *err.kind
        {
            if we.code == 11000 {
                return StoreError::Duplicate(we.message.clone());
            }
        }

        StoreError::Backend(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Backend(format!("serialization failed: {}", err))
    }
}

/// Rows removed by an adventure cascade, in deletion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub submissions: u64,
    pub attempts: u64,
    pub leaderboard_entries: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    // Users
    async fn upsert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    // Problems
    async fn problem_access_code_taken(&self, code: &str) -> StoreResult<bool>;
    async fn insert_problem(&self, problem: &Problem) -> StoreResult<()>;
    async fn find_problem(&self, problem_id: &str) -> StoreResult<Option<Problem>>;
    async fn find_problem_by_access_code(&self, code: &str) -> StoreResult<Option<Problem>>;
    async fn list_problems_by_creator(&self, creator_id: &str) -> StoreResult<Vec<Problem>>;
    async fn delete_problem(&self, problem_id: &str) -> StoreResult<bool>;
    async fn increment_problem_completions(&self, problem_id: &str) -> StoreResult<Option<i64>>;

    // Adventures
    async fn adventure_access_code_taken(&self, code: &str) -> StoreResult<bool>;
    async fn insert_adventure(&self, adventure: &Adventure) -> StoreResult<()>;
    async fn find_adventure(&self, adventure_id: &str) -> StoreResult<Option<Adventure>>;
    async fn find_adventure_by_access_code(&self, code: &str) -> StoreResult<Option<Adventure>>;
    async fn list_adventures_by_creator(&self, creator_id: &str) -> StoreResult<Vec<Adventure>>;
    async fn list_public_approved_adventures(&self) -> StoreResult<Vec<Adventure>>;
    /// Persists definition and moderation fields; aggregate stats are left
    /// untouched. Returns false when the adventure no longer exists.
    async fn save_adventure_definition(&self, adventure: &Adventure) -> StoreResult<bool>;
    /// Removes submissions, then attempts, then leaderboard entries, then the
    /// adventure itself, atomically.
    async fn delete_adventure_cascade(&self, adventure_id: &str) -> StoreResult<CascadeReport>;

    // Attempts
    async fn find_attempt(&self, attempt_id: &str) -> StoreResult<Option<AdventureAttempt>>;
    async fn list_attempts(
        &self,
        user_id: &str,
        adventure_id: Option<&str>,
    ) -> StoreResult<Vec<AdventureAttempt>>;
    async fn list_submissions(&self, attempt_id: &str) -> StoreResult<Vec<ProblemSubmission>>;

    // Leaderboard
    /// Entries with a completion time, fastest first, joined to usernames.
    /// Entries whose user is unknown are skipped.
    async fn ranked_entries(&self, adventure_id: &str, limit: usize)
        -> StoreResult<Vec<RankedEntry>>;

    /// Opens a unit of work holding the adventure row lock.
    /// Returns `Ok(None)` when the adventure does not exist.
    async fn begin(&self, adventure_id: &str) -> StoreResult<Option<Box<dyn AdventureTx>>>;
}

/// Unit of work over one adventure aggregate. Nothing written through it is
/// visible to other readers before [`AdventureTx::commit`]; dropping it
/// without committing discards every write.
#[async_trait]
pub trait AdventureTx: Send {
    /// The adventure as read under the lock.
    fn adventure(&self) -> &Adventure;

    async fn find_attempt(&mut self, attempt_id: &str) -> StoreResult<Option<AdventureAttempt>>;
    async fn find_open_attempt(&mut self, user_id: &str) -> StoreResult<Option<AdventureAttempt>>;
    async fn has_completed_attempt(
        &mut self,
        user_id: &str,
        excluding_attempt: Option<&str>,
    ) -> StoreResult<bool>;
    /// Durations of every completed attempt, including ones written in this unit.
    async fn completed_durations(&mut self) -> StoreResult<Vec<i64>>;

    async fn insert_attempt(&mut self, attempt: &AdventureAttempt) -> StoreResult<()>;
    async fn save_attempt(&mut self, attempt: &AdventureAttempt) -> StoreResult<()>;
    async fn insert_submission(&mut self, submission: &ProblemSubmission) -> StoreResult<()>;
    async fn insert_leaderboard_entry(&mut self, entry: &LeaderboardEntry) -> StoreResult<()>;
    async fn save_stats(&mut self, stats: &AdventureStats) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
