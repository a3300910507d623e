use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};

use super::{AdventureTx, CascadeReport, Store, StoreError, StoreResult};
use crate::metrics::track_db_operation;
use crate::models::{
    Adventure, AdventureAttempt, AdventureStats, LeaderboardEntry, Problem, ProblemSubmission,
    RankedEntry, User,
};

const ADVENTURES: &str = "adventures";
const ATTEMPTS: &str = "adventure_attempts";
const SUBMISSIONS: &str = "adventure_submissions";
const LEADERBOARD: &str = "leaderboard";
const PROBLEMS: &str = "problems";
const USERS: &str = "users";

/// MongoDB-backed store. Units of work are multi-document transactions and
/// need a replica set deployment.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    fn adventures(&self) -> Collection<Adventure> {
        self.db.collection(ADVENTURES)
    }

    fn attempts(&self) -> Collection<AdventureAttempt> {
        self.db.collection(ATTEMPTS)
    }

    fn submissions(&self) -> Collection<ProblemSubmission> {
        self.db.collection(SUBMISSIONS)
    }

    fn leaderboard(&self) -> Collection<LeaderboardEntry> {
        self.db.collection(LEADERBOARD)
    }

    fn problems(&self) -> Collection<Problem> {
        self.db.collection(PROBLEMS)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.adventures()
            .create_indexes([
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "access_code": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder().keys(doc! { "creator_id": 1 }).build(),
                IndexModel::builder()
                    .keys(doc! { "is_public": 1, "approval_status": 1 })
                    .build(),
            ])
            .await?;

        self.attempts()
            .create_indexes([
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "adventure_id": 1 })
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "adventure_id": 1, "completed": 1 })
                    .build(),
            ])
            .await?;

        self.submissions()
            .create_index(IndexModel::builder().keys(doc! { "attempt_id": 1 }).build())
            .await?;

        self.leaderboard()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "adventure_id": 1, "completion_ms": 1 })
                    .build(),
            )
            .await?;

        self.problems()
            .create_indexes([
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "access_code": 1 })
                    .options(unique())
                    .build(),
            ])
            .await?;

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    /// Starts a transaction and takes the adventure row lock by bumping its
    /// `lock_version`. A concurrent holder makes this fail with a transient
    /// write conflict.
    async fn lock_adventure(
        &self,
        adventure_id: &str,
    ) -> StoreResult<Option<(ClientSession, Adventure)>> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let adventure = self
            .adventures()
            .find_one_and_update(
                doc! { "id": adventure_id },
                doc! { "$inc": { "lock_version": 1_i64 } },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .session(&mut session)
            .await?;

        match adventure {
            Some(adventure) => Ok(Some((session, adventure))),
            None => {
                session.abort_transaction().await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn upsert_user(&self, user: &User) -> StoreResult<()> {
        self.users()
            .update_one(
                doc! { "id": &user.id },
                doc! { "$set": { "id": &user.id, "username": &user.username } },
            )
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "id": user_id }).await?)
    }

    async fn problem_access_code_taken(&self, code: &str) -> StoreResult<bool> {
        let count = self
            .problems()
            .count_documents(doc! { "access_code": code })
            .await?;
        Ok(count > 0)
    }

    async fn insert_problem(&self, problem: &Problem) -> StoreResult<()> {
        track_db_operation("insert", PROBLEMS, async {
            self.problems().insert_one(problem).await.map(|_| ())
        })
        .await?;
        Ok(())
    }

    async fn find_problem(&self, problem_id: &str) -> StoreResult<Option<Problem>> {
        Ok(self.problems().find_one(doc! { "id": problem_id }).await?)
    }

    async fn find_problem_by_access_code(&self, code: &str) -> StoreResult<Option<Problem>> {
        Ok(track_db_operation("find", PROBLEMS, async {
            self.problems().find_one(doc! { "access_code": code }).await
        })
        .await?)
    }

    async fn list_problems_by_creator(&self, creator_id: &str) -> StoreResult<Vec<Problem>> {
        let cursor = self
            .problems()
            .find(doc! { "creator_id": creator_id })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_problem(&self, problem_id: &str) -> StoreResult<bool> {
        let result = self.problems().delete_one(doc! { "id": problem_id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn increment_problem_completions(&self, problem_id: &str) -> StoreResult<Option<i64>> {
        let updated = self
            .problems()
            .find_one_and_update(
                doc! { "id": problem_id },
                doc! { "$inc": { "completions": 1_i64 } },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?;
        Ok(updated.map(|p| p.completions))
    }

    async fn adventure_access_code_taken(&self, code: &str) -> StoreResult<bool> {
        let count = self
            .adventures()
            .count_documents(doc! { "access_code": code })
            .await?;
        Ok(count > 0)
    }

    async fn insert_adventure(&self, adventure: &Adventure) -> StoreResult<()> {
        track_db_operation("insert", ADVENTURES, async {
            self.adventures().insert_one(adventure).await.map(|_| ())
        })
        .await?;
        Ok(())
    }

    async fn find_adventure(&self, adventure_id: &str) -> StoreResult<Option<Adventure>> {
        Ok(track_db_operation("find", ADVENTURES, async {
            self.adventures().find_one(doc! { "id": adventure_id }).await
        })
        .await?)
    }

    async fn find_adventure_by_access_code(&self, code: &str) -> StoreResult<Option<Adventure>> {
        Ok(self
            .adventures()
            .find_one(doc! { "access_code": code })
            .await?)
    }

    async fn list_adventures_by_creator(&self, creator_id: &str) -> StoreResult<Vec<Adventure>> {
        let cursor = self
            .adventures()
            .find(doc! { "creator_id": creator_id })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_public_approved_adventures(&self) -> StoreResult<Vec<Adventure>> {
        let cursor = self
            .adventures()
            .find(doc! { "is_public": true, "approval_status": "approved" })
            .with_options(FindOptions::builder().sort(doc! { "created_at": 1 }).build())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn save_adventure_definition(&self, adventure: &Adventure) -> StoreResult<bool> {
        let mut fields = bson::to_document(adventure)?;
        fields.remove("stats");
        fields.remove("id");

        let result = track_db_operation("update", ADVENTURES, async {
            self.adventures()
                .update_one(doc! { "id": &adventure.id }, doc! { "$set": fields })
                .await
        })
        .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_adventure_cascade(&self, adventure_id: &str) -> StoreResult<CascadeReport> {
        let Some((mut session, _)) = self.lock_adventure(adventure_id).await? else {
            return Ok(CascadeReport::default());
        };

        let mut attempt_ids = Vec::new();
        let mut cursor = self
            .attempts()
            .find(doc! { "adventure_id": adventure_id })
            .session(&mut session)
            .await?;
        while let Some(attempt) = cursor.next(&mut session).await {
            attempt_ids.push(attempt?.id);
        }
        drop(cursor);

        let submissions = self
            .submissions()
            .delete_many(doc! { "attempt_id": { "$in": attempt_ids } })
            .session(&mut session)
            .await?;
        let attempts = self
            .attempts()
            .delete_many(doc! { "adventure_id": adventure_id })
            .session(&mut session)
            .await?;
        let entries = self
            .leaderboard()
            .delete_many(doc! { "adventure_id": adventure_id })
            .session(&mut session)
            .await?;
        self.adventures()
            .delete_one(doc! { "id": adventure_id })
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;

        Ok(CascadeReport {
            submissions: submissions.deleted_count,
            attempts: attempts.deleted_count,
            leaderboard_entries: entries.deleted_count,
        })
    }

    async fn find_attempt(&self, attempt_id: &str) -> StoreResult<Option<AdventureAttempt>> {
        Ok(self.attempts().find_one(doc! { "id": attempt_id }).await?)
    }

    async fn list_attempts(
        &self,
        user_id: &str,
        adventure_id: Option<&str>,
    ) -> StoreResult<Vec<AdventureAttempt>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(adventure_id) = adventure_id {
            filter.insert("adventure_id", adventure_id);
        }

        let cursor = self.attempts().find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_submissions(&self, attempt_id: &str) -> StoreResult<Vec<ProblemSubmission>> {
        let cursor = self
            .submissions()
            .find(doc! { "attempt_id": attempt_id })
            .with_options(FindOptions::builder().sort(doc! { "created_at": 1 }).build())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn ranked_entries(
        &self,
        adventure_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<RankedEntry>> {
        let pipeline = vec![
            doc! { "$match": { "adventure_id": adventure_id, "completion_ms": { "$ne": null } } },
            doc! { "$sort": { "completion_ms": 1, "completed_at": 1 } },
            doc! { "$lookup": {
                "from": USERS,
                "localField": "user_id",
                "foreignField": "id",
                "as": "user",
            } },
            doc! { "$unwind": "$user" },
            doc! { "$limit": limit as i64 },
        ];

        let docs: Vec<Document> = self
            .leaderboard()
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;

        docs.into_iter()
            .map(|row| {
                let username = row
                    .get_document("user")
                    .and_then(|u| u.get_str("username"))
                    .map(str::to_string)
                    .map_err(|e| StoreError::Backend(format!("malformed user join: {}", e)))?;
                let entry: LeaderboardEntry = bson::from_document(row)
                    .map_err(|e| StoreError::Backend(format!("malformed entry: {}", e)))?;
                Ok(RankedEntry { entry, username })
            })
            .collect()
    }

    async fn begin(&self, adventure_id: &str) -> StoreResult<Option<Box<dyn AdventureTx>>> {
        let locked = track_db_operation("lock", ADVENTURES, async {
            self.lock_adventure(adventure_id).await
        })
        .await?;

        Ok(locked.map(|(session, adventure)| {
            Box::new(MongoTx {
                store: self.clone(),
                session,
                adventure,
            }) as Box<dyn AdventureTx>
        }))
    }
}

struct MongoTx {
    store: MongoStore,
    session: ClientSession,
    adventure: Adventure,
}

impl MongoTx {
    async fn find_attempts(&mut self, filter: Document) -> StoreResult<Vec<AdventureAttempt>> {
        let mut cursor = self
            .store
            .attempts()
            .find(filter)
            .session(&mut self.session)
            .await?;

        let mut attempts = Vec::new();
        while let Some(attempt) = cursor.next(&mut self.session).await {
            attempts.push(attempt?);
        }
        Ok(attempts)
    }
}

#[async_trait]
impl AdventureTx for MongoTx {
    fn adventure(&self) -> &Adventure {
        &self.adventure
    }

    async fn find_attempt(&mut self, attempt_id: &str) -> StoreResult<Option<AdventureAttempt>> {
        Ok(self
            .store
            .attempts()
            .find_one(doc! { "id": attempt_id, "adventure_id": &self.adventure.id })
            .session(&mut self.session)
            .await?)
    }

    async fn find_open_attempt(&mut self, user_id: &str) -> StoreResult<Option<AdventureAttempt>> {
        Ok(self
            .store
            .attempts()
            .find_one(doc! {
                "adventure_id": &self.adventure.id,
                "user_id": user_id,
                "completed": false,
            })
            .session(&mut self.session)
            .await?)
    }

    async fn has_completed_attempt(
        &mut self,
        user_id: &str,
        excluding_attempt: Option<&str>,
    ) -> StoreResult<bool> {
        let mut filter = doc! {
            "adventure_id": &self.adventure.id,
            "user_id": user_id,
            "completed": true,
        };
        if let Some(excluded) = excluding_attempt {
            filter.insert("id", doc! { "$ne": excluded });
        }

        let count = self
            .store
            .attempts()
            .count_documents(filter)
            .session(&mut self.session)
            .await?;
        Ok(count > 0)
    }

    async fn completed_durations(&mut self) -> StoreResult<Vec<i64>> {
        let filter = doc! {
            "adventure_id": &self.adventure.id,
            "completed": true,
            "duration_ms": { "$ne": null },
        };
        Ok(self
            .find_attempts(filter)
            .await?
            .into_iter()
            .filter_map(|a| a.duration_ms)
            .collect())
    }

    async fn insert_attempt(&mut self, attempt: &AdventureAttempt) -> StoreResult<()> {
        self.store
            .attempts()
            .insert_one(attempt)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn save_attempt(&mut self, attempt: &AdventureAttempt) -> StoreResult<()> {
        self.store
            .attempts()
            .replace_one(doc! { "id": &attempt.id }, attempt)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn insert_submission(&mut self, submission: &ProblemSubmission) -> StoreResult<()> {
        self.store
            .submissions()
            .insert_one(submission)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn insert_leaderboard_entry(&mut self, entry: &LeaderboardEntry) -> StoreResult<()> {
        self.store
            .leaderboard()
            .insert_one(entry)
            .session(&mut self.session)
            .await?;
        Ok(())
    }

    async fn save_stats(&mut self, stats: &AdventureStats) -> StoreResult<()> {
        let stats_bson = bson::to_bson(stats)?;
        self.store
            .adventures()
            .update_one(
                doc! { "id": &self.adventure.id },
                doc! { "$set": { "stats": stats_bson } },
            )
            .session(&mut self.session)
            .await?;
        self.adventure.stats = stats.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = *self;
        track_db_operation("commit", ADVENTURES, async {
            this.session.commit_transaction().await
        })
        .await?;
        Ok(())
    }
}
