use crate::core::submission::ProjectPayload;
use crate::core::{ConfigProvider, ProjectApi};
use crate::domain::memo::{MemoRecord, PaymentMemo, ProjectCostDetail};
use crate::domain::model::{Client, Consultant, SdgGoal};
use crate::domain::ports::{CreateMemoResponse, CreateProjectResponse};
use crate::utils::error::{CostingError, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const CREATE_PROJECT_PATH: &str = "admin/project/create";
pub const CONSULTANT_LIST_PATH: &str = "public/consultant/list";
pub const CLIENT_LIST_PATH: &str = "public/client/list";
pub const SDG_LIST_PATH: &str = "public/sdg-goals/list";
pub const COST_DETAIL_PATH: &str = "admin/project/cost-detail";
pub const MEMO_PATH: &str = "admin/memo";

/// `ProjectApi` over the portal's REST backend.
pub struct HttpProjectApi {
    client: HttpClient,
    base_url: String,
    access_token: Option<String>,
}

impl HttpProjectApi {
    pub fn new<C: ConfigProvider>(config: &C) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_seconds()))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url().trim_end_matches('/').to_string(),
            access_token: config.access_token().map(str::to_string),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Public endpoints are called without a bearer token.
    fn authorize(&self, path: &str, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) if !path.starts_with("public/") => request.bearer_auth(token),
            _ => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!("GET {}", self.url(path));
        let request = self.authorize(path, self.client.get(self.url(path)));
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn post_created<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<CreateProjectResponse> {
        let request = self.authorize(path, self.client.post(self.url(path)).json(body));
        let response = check_status(request.send().await?).await?;

        // 有些版本的後端只回 {"id": ..}
        let body: serde_json::Value = response.json().await?;
        let mut created: CreateProjectResponse = serde_json::from_value(body.clone())?;
        if !created.success && body.get("success").is_none() {
            created.success = true;
        }
        Ok(created)
    }
}

#[derive(serde::Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

/// Maps non-success responses onto the error kinds the wizard surfaces.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let message = match (parsed.message, parsed.errors) {
        (Some(message), Some(errors)) => format!("{} {}", message, errors),
        (Some(message), None) => message,
        (None, Some(errors)) => errors.to_string(),
        (None, None) => "Request failed".to_string(),
    };
    tracing::warn!("API responded {}: {}", status, message);

    Err(match status {
        StatusCode::UNPROCESSABLE_ENTITY => CostingError::ValidationError { message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CostingError::AuthError {
            status: status.as_u16(),
            message,
        },
        StatusCode::NOT_FOUND => CostingError::NotFound { message },
        s if s.is_server_error() => CostingError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => CostingError::RequestFailed {
            status: s.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl ProjectApi for HttpProjectApi {
    async fn create_project(&self, payload: &ProjectPayload) -> Result<CreateProjectResponse> {
        self.post_created(CREATE_PROJECT_PATH, payload).await
    }

    async fn consultant_list(&self) -> Result<Vec<Consultant>> {
        self.get_json(CONSULTANT_LIST_PATH).await
    }

    async fn client_list(&self) -> Result<Vec<Client>> {
        self.get_json(CLIENT_LIST_PATH).await
    }

    async fn sdg_list(&self) -> Result<Vec<SdgGoal>> {
        self.get_json(SDG_LIST_PATH).await
    }

    async fn cost_detail(&self, project_id: i64) -> Result<ProjectCostDetail> {
        self.get_json(&format!("{}?projectId={}", COST_DETAIL_PATH, project_id))
            .await
    }

    async fn create_memo(&self, memo: &PaymentMemo) -> Result<CreateMemoResponse> {
        tracing::info!("Creating memo {}", memo.reference_no);
        self.post_created(MEMO_PATH, memo).await
    }

    async fn memos_by_project(&self, project_id: i64) -> Result<Vec<MemoRecord>> {
        self.get_json(&format!("{}/project/{}", MEMO_PATH, project_id))
            .await
    }

    async fn memo(&self, memo_id: i64) -> Result<MemoRecord> {
        self.get_json(&format!("{}/{}", MEMO_PATH, memo_id)).await
    }

    async fn mark_memo_paid(&self, memo_id: i64) -> Result<()> {
        let path = format!("{}/{}/pay", MEMO_PATH, memo_id);
        tracing::debug!("PUT {}", self.url(&path));
        let request = self.authorize(&path, self.client.put(self.url(&path)));
        check_status(request.send().await?).await?;
        Ok(())
    }
}
