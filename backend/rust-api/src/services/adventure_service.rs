use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::adventure::{
    AdventureSummary, CreateAdventureRequest, ReviewDecision, UpdateAdventureRequest,
};
use crate::models::{Adventure, AdventureStats, ApprovalStatus, User};
use crate::services::graph_validator;
use crate::services::leaderboard_service::LeaderboardService;
use crate::store::{CascadeReport, Store, StoreError};
use crate::utils::access_code;

pub struct AdventureService {
    store: Arc<dyn Store>,
}

impl AdventureService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validates the graph, allocates a unique access code and stores the
    /// adventure with zeroed counters.
    pub async fn create(&self, req: CreateAdventureRequest, owner: &User) -> AppResult<Adventure> {
        self.create_at(req, owner, Utc::now()).await
    }

    async fn create_at(
        &self,
        req: CreateAdventureRequest,
        owner: &User,
        now: DateTime<Utc>,
    ) -> AppResult<Adventure> {
        let (start_node_id, end_node_id) =
            graph_validator::validate(&req.graph.nodes, &req.graph.edges)?;

        let mut adventure = Adventure {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            description: req.description,
            creator_id: owner.id.clone(),
            created_at: now,
            graph: req.graph,
            start_node_id,
            end_node_id,
            is_public: false,
            approval_status: ApprovalStatus::initial(req.request_public),
            approval_requested_at: req.request_public.then_some(now),
            approved_at: None,
            approved_by: None,
            access_code: String::new(),
            stats: AdventureStats::default(),
        };

        for _ in 0..access_code::MAX_GENERATION_ATTEMPTS {
            let code = access_code::generate();
            if self.store.adventure_access_code_taken(&code).await? {
                continue;
            }
            adventure.access_code = code;

            match self.store.insert_adventure(&adventure).await {
                Ok(()) => {
                    tracing::info!(
                        "Adventure {} created by {} (status: {})",
                        adventure.id,
                        owner.id,
                        adventure.approval_status.as_str()
                    );
                    return Ok(adventure);
                }
                // Lost a race for the code; draw another one
                Err(StoreError::Duplicate(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "Could not allocate a unique adventure access code"
        )))
    }

    /// Applies a partial patch. A replacement graph must keep the existing
    /// start and end nodes.
    pub async fn update(
        &self,
        adventure_id: &str,
        patch: UpdateAdventureRequest,
        owner: &User,
    ) -> AppResult<Adventure> {
        self.update_at(adventure_id, patch, owner, Utc::now()).await
    }

    async fn update_at(
        &self,
        adventure_id: &str,
        patch: UpdateAdventureRequest,
        owner: &User,
        now: DateTime<Utc>,
    ) -> AppResult<Adventure> {
        let mut adventure = self.get_by_id(adventure_id).await?;
        if !adventure.is_owned_by(&owner.id) {
            tracing::warn!(
                "User {} tried to update adventure {} owned by {}",
                owner.id,
                adventure.id,
                adventure.creator_id
            );
            return Err(AppError::forbidden("You can only update your own adventures"));
        }

        if let Some(name) = patch.name {
            adventure.name = name;
        }
        if let Some(description) = patch.description {
            adventure.description = Some(description);
        }
        if let Some(graph) = patch.graph {
            let (start, end) = graph_validator::validate(&graph.nodes, &graph.edges)?;
            if start != adventure.start_node_id || end != adventure.end_node_id {
                return Err(AppError::validation(format!(
                    "Graph start/end cannot change (expected {} -> {}, got {} -> {})",
                    adventure.start_node_id, adventure.end_node_id, start, end
                )));
            }
            adventure.graph = graph;
        }
        if patch.request_public == Some(true)
            && matches!(
                adventure.approval_status,
                ApprovalStatus::Draft | ApprovalStatus::Rejected
            )
        {
            adventure.approval_status = ApprovalStatus::Pending;
            adventure.approval_requested_at = Some(now);
        }

        if !self.store.save_adventure_definition(&adventure).await? {
            return Err(AppError::not_found("Adventure"));
        }

        // Counters may have moved while the patch was applied
        let stored = self.get_by_id(adventure_id).await?;
        tracing::info!("Adventure {} updated by {}", adventure_id, owner.id);
        Ok(stored)
    }

    /// Removes the adventure with every attempt, submission and leaderboard
    /// entry that belongs to it.
    pub async fn delete(&self, adventure_id: &str, owner: &User) -> AppResult<CascadeReport> {
        let adventure = self.get_by_id(adventure_id).await?;
        if !adventure.is_owned_by(&owner.id) {
            tracing::warn!(
                "User {} tried to delete adventure {} owned by {}",
                owner.id,
                adventure.id,
                adventure.creator_id
            );
            return Err(AppError::forbidden("You can only delete your own adventures"));
        }

        let report = self.store.delete_adventure_cascade(adventure_id).await?;
        tracing::info!(
            "Adventure {} deleted: {} submissions, {} attempts, {} leaderboard entries",
            adventure_id,
            report.submissions,
            report.attempts,
            report.leaderboard_entries
        );
        Ok(report)
    }

    /// Publicly listed adventures with the current record holder, if any.
    pub async fn list_public_approved(&self) -> AppResult<Vec<AdventureSummary>> {
        let adventures = self.store.list_public_approved_adventures().await?;
        let leaderboard = LeaderboardService::new(self.store.clone());

        let mut summaries = Vec::with_capacity(adventures.len());
        for adventure in &adventures {
            let mut summary = AdventureSummary::from(adventure);
            if let Some(fastest) = leaderboard.fastest_for(&adventure.id).await? {
                summary.best_completion_time = Some(fastest.completion_time);
                summary.best_completion_user = Some(fastest.username);
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }

    pub async fn get_by_access_code(&self, code: &str) -> AppResult<Adventure> {
        let code = access_code::normalize(code);
        tracing::debug!("Looking up adventure by access code {}", code);
        self.store
            .find_adventure_by_access_code(&code)
            .await?
            .ok_or_else(|| AppError::not_found("Adventure"))
    }

    pub async fn get_by_id(&self, adventure_id: &str) -> AppResult<Adventure> {
        self.store
            .find_adventure(adventure_id)
            .await?
            .ok_or_else(|| AppError::not_found("Adventure"))
    }

    pub async fn list_by_creator(&self, creator: &User) -> AppResult<Vec<Adventure>> {
        Ok(self.store.list_adventures_by_creator(&creator.id).await?)
    }

    /// Moderation decision on a pending adventure.
    pub async fn review(
        &self,
        adventure_id: &str,
        decision: ReviewDecision,
        reviewer: &User,
    ) -> AppResult<Adventure> {
        self.review_at(adventure_id, decision, reviewer, Utc::now())
            .await
    }

    async fn review_at(
        &self,
        adventure_id: &str,
        decision: ReviewDecision,
        reviewer: &User,
        now: DateTime<Utc>,
    ) -> AppResult<Adventure> {
        let mut adventure = self.get_by_id(adventure_id).await?;
        if adventure.approval_status != ApprovalStatus::Pending {
            return Err(AppError::validation(format!(
                "Only pending adventures can be reviewed (current status: {})",
                adventure.approval_status.as_str()
            )));
        }

        match decision {
            ReviewDecision::Approve => {
                adventure.approval_status = ApprovalStatus::Approved;
                adventure.is_public = true;
                adventure.approved_at = Some(now);
                adventure.approved_by = Some(reviewer.id.clone());
            }
            ReviewDecision::Reject => {
                adventure.approval_status = ApprovalStatus::Rejected;
                adventure.is_public = false;
                adventure.approved_at = None;
                adventure.approved_by = None;
            }
        }

        if !self.store.save_adventure_definition(&adventure).await? {
            return Err(AppError::not_found("Adventure"));
        }

        tracing::info!(
            "Adventure {} reviewed by {}: {}",
            adventure_id,
            reviewer.id,
            adventure.approval_status.as_str()
        );
        self.get_by_id(adventure_id).await
    }
}
