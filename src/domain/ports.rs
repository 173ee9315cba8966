use crate::core::submission::ProjectPayload;
use crate::domain::memo::{MemoRecord, PaymentMemo, ProjectCostDetail};
use crate::domain::model::{Client, Consultant, ProjectDraft, SdgGoal};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The memo endpoint answers with the same envelope as project creation.
pub type CreateMemoResponse = CreateProjectResponse;

/// Where drafts are kept between CLI invocations. Nothing is sent to the
/// server until submit.
pub trait DraftStorage: Send + Sync {
    fn load_draft(&self, name: &str)
        -> impl std::future::Future<Output = Result<ProjectDraft>> + Send;
    fn save_draft(
        &self,
        name: &str,
        draft: &ProjectDraft,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Called once the project has been created on the server.
    fn remove_draft(&self, name: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn api_base_url(&self) -> &str;
    fn access_token(&self) -> Option<&str>;
    fn timeout_seconds(&self) -> u64;
}

/// Project-creation backend. Implementations map HTTP failures onto
/// `ValidationError`, `AuthError` and `ServerError`.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn create_project(&self, payload: &ProjectPayload) -> Result<CreateProjectResponse>;
    async fn consultant_list(&self) -> Result<Vec<Consultant>>;
    async fn client_list(&self) -> Result<Vec<Client>>;
    async fn sdg_list(&self) -> Result<Vec<SdgGoal>>;

    /// Paid, pending and unpaid amounts per cost line of a created project.
    async fn cost_detail(&self, project_id: i64) -> Result<ProjectCostDetail>;
    async fn create_memo(&self, memo: &PaymentMemo) -> Result<CreateMemoResponse>;
    async fn memos_by_project(&self, project_id: i64) -> Result<Vec<MemoRecord>>;
    async fn memo(&self, memo_id: i64) -> Result<MemoRecord>;
    async fn mark_memo_paid(&self, memo_id: i64) -> Result<()>;
}
