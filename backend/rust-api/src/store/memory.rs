use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{AdventureTx, CascadeReport, Store, StoreError, StoreResult};
use crate::models::{
    Adventure, AdventureAttempt, AdventureStats, LeaderboardEntry, Problem, ProblemSubmission,
    RankedEntry, User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    problems: Vec<Problem>,
    adventures: Vec<Adventure>,
    attempts: Vec<AdventureAttempt>,
    submissions: Vec<ProblemSubmission>,
    leaderboard: Vec<LeaderboardEntry>,
}

/// Process-local store used by tests and single-node development runs.
///
/// Adventure rows are guarded by per-adventure async mutexes; a unit of work
/// stages its writes and applies them under one table write lock at commit.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory table lock poisoned".to_string())
}

fn read_tables(tables: &RwLock<Tables>) -> StoreResult<RwLockReadGuard<'_, Tables>> {
    tables.read().map_err(|_| poisoned())
}

fn write_tables(tables: &RwLock<Tables>) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
    tables.write().map_err(|_| poisoned())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_row(&self, adventure_id: &str) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
            locks
                .entry(adventure_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Drops row locks nobody holds or waits on. Clones are only handed out
    /// under the map lock, so a strong count of one means the row is idle.
    fn prune_idle_rows(&self) -> StoreResult<()> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(())
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> StoreResult<usize> {
        Ok(self.row_locks.lock().map_err(|_| poisoned())?.len())
    }

    fn cascade_locked(&self, adventure_id: &str) -> StoreResult<CascadeReport> {
        let mut tables = write_tables(&self.tables)?;

        let attempt_ids: Vec<String> = tables
            .attempts
            .iter()
            .filter(|a| a.adventure_id == adventure_id)
            .map(|a| a.id.clone())
            .collect();

        let mut report = CascadeReport::default();

        let before = tables.submissions.len();
        tables
            .submissions
            .retain(|s| !attempt_ids.contains(&s.attempt_id));
        report.submissions = (before - tables.submissions.len()) as u64;

        let before = tables.attempts.len();
        tables.attempts.retain(|a| a.adventure_id != adventure_id);
        report.attempts = (before - tables.attempts.len()) as u64;

        let before = tables.leaderboard.len();
        tables.leaderboard.retain(|e| e.adventure_id != adventure_id);
        report.leaderboard_entries = (before - tables.leaderboard.len()) as u64;

        tables.adventures.retain(|a| a.id != adventure_id);

        Ok(report)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        read_tables(&self.tables).map(|_| ())
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = write_tables(&self.tables)?;
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables.users.get(user_id).cloned())
    }

    async fn problem_access_code_taken(&self, code: &str) -> StoreResult<bool> {
        let tables = read_tables(&self.tables)?;
        Ok(tables.problems.iter().any(|p| p.access_code == code))
    }

    async fn insert_problem(&self, problem: &Problem) -> StoreResult<()> {
        let mut tables = write_tables(&self.tables)?;
        if tables
            .problems
            .iter()
            .any(|p| p.id == problem.id || p.access_code == problem.access_code)
        {
            return Err(StoreError::Duplicate(format!(
                "problem access code {}",
                problem.access_code
            )));
        }
        tables.problems.push(problem.clone());
        Ok(())
    }

    async fn find_problem(&self, problem_id: &str) -> StoreResult<Option<Problem>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables.problems.iter().find(|p| p.id == problem_id).cloned())
    }

    async fn find_problem_by_access_code(&self, code: &str) -> StoreResult<Option<Problem>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .problems
            .iter()
            .find(|p| p.access_code == code)
            .cloned())
    }

    async fn list_problems_by_creator(&self, creator_id: &str) -> StoreResult<Vec<Problem>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .problems
            .iter()
            .filter(|p| p.creator_id == creator_id)
            .cloned()
            .collect())
    }

    async fn delete_problem(&self, problem_id: &str) -> StoreResult<bool> {
        let mut tables = write_tables(&self.tables)?;
        let before = tables.problems.len();
        tables.problems.retain(|p| p.id != problem_id);
        Ok(tables.problems.len() != before)
    }

    async fn increment_problem_completions(&self, problem_id: &str) -> StoreResult<Option<i64>> {
        let mut tables = write_tables(&self.tables)?;
        Ok(tables
            .problems
            .iter_mut()
            .find(|p| p.id == problem_id)
            .map(|p| {
                p.completions += 1;
                p.completions
            }))
    }

    async fn adventure_access_code_taken(&self, code: &str) -> StoreResult<bool> {
        let tables = read_tables(&self.tables)?;
        Ok(tables.adventures.iter().any(|a| a.access_code == code))
    }

    async fn insert_adventure(&self, adventure: &Adventure) -> StoreResult<()> {
        let mut tables = write_tables(&self.tables)?;
        if tables
            .adventures
            .iter()
            .any(|a| a.id == adventure.id || a.access_code == adventure.access_code)
        {
            return Err(StoreError::Duplicate(format!(
                "adventure access code {}",
                adventure.access_code
            )));
        }
        tables.adventures.push(adventure.clone());
        Ok(())
    }

    async fn find_adventure(&self, adventure_id: &str) -> StoreResult<Option<Adventure>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .adventures
            .iter()
            .find(|a| a.id == adventure_id)
            .cloned())
    }

    async fn find_adventure_by_access_code(&self, code: &str) -> StoreResult<Option<Adventure>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .adventures
            .iter()
            .find(|a| a.access_code == code)
            .cloned())
    }

    async fn list_adventures_by_creator(&self, creator_id: &str) -> StoreResult<Vec<Adventure>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .adventures
            .iter()
            .filter(|a| a.creator_id == creator_id)
            .cloned()
            .collect())
    }

    async fn list_public_approved_adventures(&self) -> StoreResult<Vec<Adventure>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .adventures
            .iter()
            .filter(|a| a.is_listed())
            .cloned()
            .collect())
    }

    async fn save_adventure_definition(&self, adventure: &Adventure) -> StoreResult<bool> {
        let mut tables = write_tables(&self.tables)?;
        let Some(stored) = tables.adventures.iter_mut().find(|a| a.id == adventure.id) else {
            return Ok(false);
        };

        let stats = stored.stats.clone();
        *stored = adventure.clone();
        stored.stats = stats;
        Ok(true)
    }

    async fn delete_adventure_cascade(&self, adventure_id: &str) -> StoreResult<CascadeReport> {
        let row = self.lock_row(adventure_id).await?;
        let report = self.cascade_locked(adventure_id)?;
        drop(row);
        self.prune_idle_rows()?;
        Ok(report)
    }

    async fn find_attempt(&self, attempt_id: &str) -> StoreResult<Option<AdventureAttempt>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables.attempts.iter().find(|a| a.id == attempt_id).cloned())
    }

    async fn list_attempts(
        &self,
        user_id: &str,
        adventure_id: Option<&str>,
    ) -> StoreResult<Vec<AdventureAttempt>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| adventure_id.map_or(true, |id| a.adventure_id == id))
            .cloned()
            .collect())
    }

    async fn list_submissions(&self, attempt_id: &str) -> StoreResult<Vec<ProblemSubmission>> {
        let tables = read_tables(&self.tables)?;
        Ok(tables
            .submissions
            .iter()
            .filter(|s| s.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn ranked_entries(
        &self,
        adventure_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RankedEntry>> {
        let tables = read_tables(&self.tables)?;

        let mut ranked: Vec<RankedEntry> = tables
            .leaderboard
            .iter()
            .filter(|e| e.adventure_id == adventure_id && e.completion_ms.is_some())
            .filter_map(|e| {
                tables.users.get(&e.user_id).map(|user| RankedEntry {
                    entry: e.clone(),
                    username: user.username.clone(),
                })
            })
            .collect();

        // Stable sort: ties keep insertion order.
        ranked.sort_by_key(|r| r.entry.completion_ms);
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn begin(&self, adventure_id: &str) -> StoreResult<Option<Box<dyn AdventureTx>>> {
        let row = self.lock_row(adventure_id).await?;

        let adventure = {
            let tables = read_tables(&self.tables)?;
            tables
                .adventures
                .iter()
                .find(|a| a.id == adventure_id)
                .cloned()
        };

        let Some(adventure) = adventure else {
            drop(row);
            self.prune_idle_rows()?;
            return Ok(None);
        };

        Ok(Some(Box::new(InMemoryTx {
            tables: self.tables.clone(),
            _row: row,
            adventure,
            staged_attempts: Vec::new(),
            staged_submissions: Vec::new(),
            staged_entries: Vec::new(),
            staged_stats: None,
        }) as Box<dyn AdventureTx>))
    }
}

struct InMemoryTx {
    tables: Arc<RwLock<Tables>>,
    _row: OwnedMutexGuard<()>,
    adventure: Adventure,
    staged_attempts: Vec<AdventureAttempt>,
    staged_submissions: Vec<ProblemSubmission>,
    staged_entries: Vec<LeaderboardEntry>,
    staged_stats: Option<AdventureStats>,
}

impl InMemoryTx {
    /// Committed attempts of this adventure overlaid with staged writes.
    fn attempts_view(&self) -> StoreResult<Vec<AdventureAttempt>> {
        let tables = read_tables(&self.tables)?;
        let mut view: Vec<AdventureAttempt> = tables
            .attempts
            .iter()
            .filter(|a| a.adventure_id == self.adventure.id)
            .map(|a| {
                self.staged_attempts
                    .iter()
                    .find(|s| s.id == a.id)
                    .unwrap_or(a)
                    .clone()
            })
            .collect();

        for staged in &self.staged_attempts {
            if !view.iter().any(|a| a.id == staged.id) {
                view.push(staged.clone());
            }
        }
        Ok(view)
    }

    fn stage_attempt(&mut self, attempt: &AdventureAttempt) {
        match self.staged_attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(existing) => *existing = attempt.clone(),
            None => self.staged_attempts.push(attempt.clone()),
        }
    }
}

#[async_trait]
impl AdventureTx for InMemoryTx {
    fn adventure(&self) -> &Adventure {
        &self.adventure
    }

    async fn find_attempt(&mut self, attempt_id: &str) -> StoreResult<Option<AdventureAttempt>> {
        Ok(self
            .attempts_view()?
            .into_iter()
            .find(|a| a.id == attempt_id))
    }

    async fn find_open_attempt(&mut self, user_id: &str) -> StoreResult<Option<AdventureAttempt>> {
        Ok(self
            .attempts_view()?
            .into_iter()
            .find(|a| a.user_id == user_id && a.is_in_progress()))
    }

    async fn has_completed_attempt(
        &mut self,
        user_id: &str,
        excluding_attempt: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(self.attempts_view()?.iter().any(|a| {
            a.user_id == user_id && a.completed && Some(a.id.as_str()) != excluding_attempt
        }))
    }

    async fn completed_durations(&mut self) -> StoreResult<Vec<i64>> {
        Ok(self
            .attempts_view()?
            .iter()
            .filter(|a| a.completed)
            .filter_map(|a| a.duration_ms)
            .collect())
    }

    async fn insert_attempt(&mut self, attempt: &AdventureAttempt) -> StoreResult<()> {
        if self.attempts_view()?.iter().any(|a| a.id == attempt.id) {
            return Err(StoreError::Duplicate(format!("attempt {}", attempt.id)));
        }
        self.staged_attempts.push(attempt.clone());
        Ok(())
    }

    async fn save_attempt(&mut self, attempt: &AdventureAttempt) -> StoreResult<()> {
        self.stage_attempt(attempt);
        Ok(())
    }

    async fn insert_submission(&mut self, submission: &ProblemSubmission) -> StoreResult<()> {
        self.staged_submissions.push(submission.clone());
        Ok(())
    }

    async fn insert_leaderboard_entry(&mut self, entry: &LeaderboardEntry) -> StoreResult<()> {
        self.staged_entries.push(entry.clone());
        Ok(())
    }

    async fn save_stats(&mut self, stats: &AdventureStats) -> StoreResult<()> {
        self.adventure.stats = stats.clone();
        self.staged_stats = Some(stats.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let mut tables = write_tables(&this.tables)?;

        if !tables.adventures.iter().any(|a| a.id == this.adventure.id) {
            return Err(StoreError::Backend(format!(
                "adventure {} removed before commit",
                this.adventure.id
            )));
        }

        for attempt in this.staged_attempts {
            match tables.attempts.iter_mut().find(|a| a.id == attempt.id) {
                Some(existing) => *existing = attempt,
                None => tables.attempts.push(attempt),
            }
        }
        tables.submissions.extend(this.staged_submissions);
        tables.leaderboard.extend(this.staged_entries);

        if let Some(stats) = this.staged_stats {
            if let Some(adventure) = tables
                .adventures
                .iter_mut()
                .find(|a| a.id == this.adventure.id)
            {
                adventure.stats = stats;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::adventure::GraphData;
    use crate::models::ApprovalStatus;
    use chrono::Utc;

    fn adventure(id: &str, code: &str) -> Adventure {
        Adventure {
            id: id.to_string(),
            name: "Strings".to_string(),
            description: None,
            creator_id: "author".to_string(),
            created_at: Utc::now(),
            graph: GraphData::default(),
            start_node_id: "a".to_string(),
            end_node_id: "b".to_string(),
            is_public: false,
            approval_status: ApprovalStatus::Draft,
            approval_requested_at: None,
            approved_at: None,
            approved_by: None,
            access_code: code.to_string(),
            stats: AdventureStats::default(),
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_no_trace() {
        let store = InMemoryStore::new();
        let adv = adventure("adv-1", "aaaaaa");
        store.insert_adventure(&adv).await.unwrap();

        {
            let mut tx = store.begin("adv-1").await.unwrap().unwrap();
            let attempt = AdventureAttempt::begin(&adv, "u1", Utc::now());
            tx.insert_attempt(&attempt).await.unwrap();
            tx.save_stats(&AdventureStats {
                total_attempts: 1,
                ..Default::default()
            })
            .await
            .unwrap();
            assert!(tx.find_open_attempt("u1").await.unwrap().is_some());
        }

        assert!(store.list_attempts("u1", None).await.unwrap().is_empty());
        let stored = store.find_adventure("adv-1").await.unwrap().unwrap();
        assert_eq!(stored.stats.total_attempts, 0);
    }

    #[tokio::test]
    async fn committed_writes_become_visible_together() {
        let store = InMemoryStore::new();
        let adv = adventure("adv-1", "aaaaaa");
        store.insert_adventure(&adv).await.unwrap();

        let mut tx = store.begin("adv-1").await.unwrap().unwrap();
        let attempt = AdventureAttempt::begin(&adv, "u1", Utc::now());
        tx.insert_attempt(&attempt).await.unwrap();
        tx.save_stats(&AdventureStats {
            total_attempts: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.list_attempts("u1", Some("adv-1")).await.unwrap().len(), 1);
        let stored = store.find_adventure("adv-1").await.unwrap().unwrap();
        assert_eq!(stored.stats.total_attempts, 1);
    }

    #[tokio::test]
    async fn begin_on_missing_adventure_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.begin("missing").await.unwrap().is_none());
        assert_eq!(store.row_lock_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn row_locks_are_released_after_use_and_delete() {
        let store = InMemoryStore::new();
        store
            .insert_adventure(&adventure("adv-1", "aaaaaa"))
            .await
            .unwrap();

        let tx = store.begin("adv-1").await.unwrap().unwrap();
        assert_eq!(store.row_lock_count().unwrap(), 1);
        drop(tx);

        store.delete_adventure_cascade("adv-1").await.unwrap();
        assert_eq!(store.row_lock_count().unwrap(), 0);
        assert!(store.begin("adv-1").await.unwrap().is_none());
        assert_eq!(store.row_lock_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_access_code_is_rejected() {
        let store = InMemoryStore::new();
        store
            .insert_adventure(&adventure("adv-1", "abcdef"))
            .await
            .unwrap();

        let err = store
            .insert_adventure(&adventure("adv-2", "abcdef"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn definition_save_keeps_stats() {
        let store = InMemoryStore::new();
        let mut adv = adventure("adv-1", "abcdef");
        store.insert_adventure(&adv).await.unwrap();

        let mut tx = store.begin("adv-1").await.unwrap().unwrap();
        tx.save_stats(&AdventureStats {
            total_attempts: 4,
            ..Default::default()
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        adv.name = "Renamed".to_string();
        assert!(store.save_adventure_definition(&adv).await.unwrap());

        let stored = store.find_adventure("adv-1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.stats.total_attempts, 4);
    }
}
