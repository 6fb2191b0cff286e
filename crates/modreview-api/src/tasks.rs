//! Task queue endpoints.

use serde_json::json;
use tracing::{debug, instrument};

use crate::client::ApiClient;
use crate::models::{RawTask, ReviewTask, StatusMessage, SubmittedTask};
use crate::ApiResult;

impl ApiClient {
    /// Tasks assigned to the reviewer and still awaiting a review.
    pub async fn pending_reviews(&self) -> ApiResult<Vec<ReviewTask>> {
        self.review_queue("/tasks/my-pending-reviews/").await
    }

    /// Tasks the AI flagged for human review, not yet assigned.
    pub async fn review_needed(&self) -> ApiResult<Vec<ReviewTask>> {
        self.review_queue("/tasks/review-needed/").await
    }

    pub async fn assigned_tasks(&self) -> ApiResult<Vec<ReviewTask>> {
        self.review_queue("/tasks/assigned-task/").await
    }

    /// Tasks the current user submitted.
    pub async fn my_tasks(&self) -> ApiResult<Vec<SubmittedTask>> {
        self.get_json("/tasks/my-tasks/").await
    }

    #[instrument(skip(self))]
    pub async fn assign_task(&self, task_id: &str) -> ApiResult<StatusMessage> {
        self.post_json("/tasks/assign-to-me/", &json!({ "task_id": task_id }))
            .await
    }

    /// Mark a reviewed task as done once the exchange resolved.
    #[instrument(skip(self))]
    pub async fn complete_review(&self, task_id: &str) -> ApiResult<StatusMessage> {
        self.post_json("/tasks/complete-review/", &json!({ "task_id": task_id }))
            .await
    }

    async fn review_queue(&self, path: &str) -> ApiResult<Vec<ReviewTask>> {
        let raw: Vec<RawTask> = self.get_json(path).await?;
        debug!(path, count = raw.len(), "fetched review queue");
        Ok(raw.into_iter().map(ReviewTask::from).collect())
    }
}
