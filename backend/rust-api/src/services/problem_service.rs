use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::problem::CreateProblemRequest;
use crate::models::{ApprovalStatus, Problem, User};
use crate::store::{Store, StoreError};
use crate::utils::access_code;

pub struct ProblemService {
    store: Arc<dyn Store>,
}

impl ProblemService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, req: CreateProblemRequest, creator: &User) -> AppResult<Problem> {
        let mut problem = Problem {
            id: Uuid::new_v4().to_string(),
            access_code: String::new(),
            title: req.title,
            description: req.description,
            code_snippet: req.code_snippet,
            expected_output: req.expected_output,
            language: req.language.trim().to_lowercase(),
            is_public: req.is_public,
            approval_status: ApprovalStatus::initial(req.is_public),
            completions: 0,
            creator_id: creator.id.clone(),
            created_at: Utc::now(),
        };

        for _ in 0..access_code::MAX_GENERATION_ATTEMPTS {
            let code = access_code::generate();
            if self.store.problem_access_code_taken(&code).await? {
                continue;
            }
            problem.access_code = code;

            match self.store.insert_problem(&problem).await {
                Ok(()) => {
                    tracing::info!("Problem {} created by {}", problem.id, creator.id);
                    return Ok(problem);
                }
                Err(StoreError::Duplicate(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "Could not allocate a unique problem access code"
        )))
    }

    pub async fn get_by_access_code(&self, code: &str) -> AppResult<Problem> {
        let code = access_code::normalize(code);
        self.store
            .find_problem_by_access_code(&code)
            .await?
            .ok_or_else(|| AppError::not_found("Problem"))
    }

    pub async fn list_by_creator(&self, creator: &User) -> AppResult<Vec<Problem>> {
        Ok(self.store.list_problems_by_creator(&creator.id).await?)
    }

    pub async fn delete(&self, problem_id: &str, user: &User) -> AppResult<()> {
        let problem = self
            .store
            .find_problem(problem_id)
            .await?
            .ok_or_else(|| AppError::not_found("Problem"))?;

        if problem.creator_id != user.id {
            return Err(AppError::forbidden("You can only delete your own problems"));
        }

        if !self.store.delete_problem(problem_id).await? {
            return Err(AppError::not_found("Problem"));
        }
        tracing::info!("Problem {} deleted by {}", problem_id, user.id);
        Ok(())
    }

    /// Bumps the completion counter; returns the new value.
    pub async fn increment_completions(&self, problem: &Problem) -> AppResult<i64> {
        self.store
            .increment_problem_completions(&problem.id)
            .await?
            .ok_or_else(|| AppError::not_found("Problem"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn request() -> CreateProblemRequest {
        CreateProblemRequest {
            title: "Sum".to_string(),
            description: "Print 1 + 1".to_string(),
            code_snippet: String::new(),
            expected_output: "2".to_string(),
            language: "Python".to_string(),
            is_public: true,
        }
    }

    #[tokio::test]
    async fn create_then_find_by_code_in_any_case() {
        let service = ProblemService::new(Arc::new(InMemoryStore::new()));
        let author = User::new("author", "Author");

        let problem = service.create(request(), &author).await.unwrap();
        assert_eq!(problem.language, "python");
        assert!(problem.is_public);
        assert_eq!(problem.approval_status, ApprovalStatus::Pending);
        assert_eq!(problem.completions, 0);

        let found = service
            .get_by_access_code(&problem.access_code.to_uppercase())
            .await
            .unwrap();
        assert_eq!(found.id, problem.id);
    }

    #[tokio::test]
    async fn private_problem_stays_draft() {
        let service = ProblemService::new(Arc::new(InMemoryStore::new()));
        let req = CreateProblemRequest {
            is_public: false,
            ..request()
        };

        let problem = service
            .create(req, &User::new("author", "Author"))
            .await
            .unwrap();
        assert!(!problem.is_public);
        assert_eq!(problem.approval_status, ApprovalStatus::Draft);
    }

    #[tokio::test]
    async fn delete_checks_ownership() {
        let service = ProblemService::new(Arc::new(InMemoryStore::new()));
        let problem = service
            .create(request(), &User::new("author", "Author"))
            .await
            .unwrap();

        let err = service
            .delete(&problem.id, &User::new("other", "Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorisation(_)));

        service
            .delete(&problem.id, &User::new("author", "Author"))
            .await
            .unwrap();
        let err = service
            .delete(&problem.id, &User::new("author", "Author"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn completions_increment() {
        let service = ProblemService::new(Arc::new(InMemoryStore::new()));
        let problem = service
            .create(request(), &User::new("author", "Author"))
            .await
            .unwrap();

        assert_eq!(service.increment_completions(&problem).await.unwrap(), 1);
        assert_eq!(service.increment_completions(&problem).await.unwrap(), 2);
    }
}
