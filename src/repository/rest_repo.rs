// ==========================================
// 考试排考系统 - 远端排考服务 REST 实现
// ==========================================
// 职责: 通过 HTTP/JSON 访问学期/考场/考试/分配接口
// 分页: 兼容裸数组与 {results, next, count}；沿 next 读尽，next 重复视为错误
// 错误: 非 2xx 响应体 → detail/message 文本 或 字段级校验表
// ==========================================

use crate::domain::exam::{
    Allocation, CreateAllocationPayload, CreateExamPayload, Exam, Room, Term,
    UpdateAllocationPayload,
};
use crate::domain::types::EntityId;
use crate::repository::error::{FieldErrors, RepositoryError, RepositoryResult};
use crate::repository::exam_board_repo::ExamBoardRepository;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 请求超时
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// 单次列表读取的最大页数
const MAX_PAGES: usize = 1000;

/// 列表响应：裸数组或分页对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Page<T> {
    List(Vec<T>),
    Paged {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
    },
}

impl<T> Page<T> {
    fn into_parts(self) -> (Vec<T>, Option<String>) {
        match self {
            Page::List(items) => (items, None),
            Page::Paged { results, next } => (results, next.filter(|n| !n.trim().is_empty())),
        }
    }
}

// ==========================================
// RestExamBoardRepository
// ==========================================
#[derive(Debug, Clone)]
pub struct RestExamBoardRepository {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestExamBoardRepository {
    /// 创建 REST 仓储
    ///
    /// # 参数
    /// - base_url: 服务根地址（如 `http://localhost:8000`）
    /// - token: Bearer 令牌（可选）
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> RepositoryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> RepositoryResult<T> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> RepositoryResult<T> {
        self.send_json(self.client.get(url)).await
    }

    /// 沿 next 游标读尽分页
    async fn fetch_all<T: DeserializeOwned>(&self, first: String) -> RepositoryResult<Vec<T>> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(first);

        while let Some(url) = cursor.take() {
            if !visited.insert(url.clone()) || visited.len() > MAX_PAGES {
                warn!(url = %url, "分页游标重复，终止读取");
                return Err(RepositoryError::PaginationLoop(url));
            }
            let page: Page<T> = self.get_json(&url).await?;
            let (results, next) = page.into_parts();
            debug!(url = %url, count = results.len(), has_next = next.is_some(), "读取分页");
            items.extend(results);
            cursor = next.map(|n| resolve_next(&self.base_url, &n));
        }
        Ok(items)
    }
}

#[async_trait]
impl ExamBoardRepository for RestExamBoardRepository {
    #[instrument(skip(self))]
    async fn list_terms(&self) -> RepositoryResult<Vec<Term>> {
        self.fetch_all(self.url("/api/terms/")).await
    }

    #[instrument(skip(self))]
    async fn list_rooms(&self) -> RepositoryResult<Vec<Room>> {
        self.fetch_all(self.url("/api/rooms/")).await
    }

    #[instrument(skip(self))]
    async fn list_exams(&self, term_id: EntityId) -> RepositoryResult<Vec<Exam>> {
        self.fetch_all(self.url(&format!("/api/exams/?term={}", term_id)))
            .await
    }

    #[instrument(skip(self))]
    async fn list_allocations(&self) -> RepositoryResult<Vec<Allocation>> {
        self.fetch_all(self.url("/api/allocations/")).await
    }

    #[instrument(skip(self, payload), fields(title = %payload.title))]
    async fn create_exam(&self, payload: &CreateExamPayload) -> RepositoryResult<Exam> {
        self.send_json(self.client.post(self.url("/api/exams/")).json(payload))
            .await
    }

    #[instrument(skip(self, payload), fields(exam = payload.exam))]
    async fn create_allocation(
        &self,
        payload: &CreateAllocationPayload,
    ) -> RepositoryResult<Allocation> {
        self.send_json(self.client.post(self.url("/api/allocations/")).json(payload))
            .await
    }

    #[instrument(skip(self, payload))]
    async fn update_allocation(
        &self,
        id: EntityId,
        payload: &UpdateAllocationPayload,
    ) -> RepositoryResult<Allocation> {
        let url = self.url(&format!("/api/allocations/{}/", id));
        self.send_json(self.client.patch(url).json(payload)).await
    }
}

/// 相对 next 地址拼接到服务根地址
fn resolve_next(base_url: &str, next: &str) -> String {
    let next = next.trim();
    if next.starts_with("http://") || next.starts_with("https://") {
        next.to_string()
    } else if next.starts_with('/') {
        format!("{}{}", base_url, next)
    } else {
        format!("{}/{}", base_url, next)
    }
}

/// 错误响应体中的单个字段值
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorValue {
    Text(String),
    List(Vec<serde_json::Value>),
    Other(serde_json::Value),
}

impl ErrorValue {
    fn messages(self) -> Vec<String> {
        let render = |v: serde_json::Value| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        match self {
            ErrorValue::Text(s) => vec![s],
            ErrorValue::List(items) => items.into_iter().map(render).collect(),
            ErrorValue::Other(v) => vec![render(v)],
        }
    }
}

/// 解析非 2xx 响应体
///
/// # 规则
/// - `{"detail": "..."}` / `{"message": "..."}` → Http
/// - 其它对象 → 字段级 Validation
/// - 非 JSON → Http（原文）
fn parse_error_body(status: u16, body: &str) -> RepositoryError {
    let parsed: Result<serde_json::Map<String, serde_json::Value>, _> = serde_json::from_str(body);
    let Ok(map) = parsed else {
        return RepositoryError::Http {
            status,
            body: body.trim().to_string(),
        };
    };

    for key in ["detail", "message"] {
        if let Some(serde_json::Value::String(text)) = map.get(key) {
            return RepositoryError::Http {
                status,
                body: text.clone(),
            };
        }
    }

    let mut fields = FieldErrors::new();
    for (field, value) in map {
        let messages = serde_json::from_value::<ErrorValue>(value)
            .map(ErrorValue::messages)
            .unwrap_or_default();
        fields.insert(field, messages);
    }
    if fields.is_empty() {
        return RepositoryError::Http {
            status,
            body: body.trim().to_string(),
        };
    }
    RepositoryError::Validation(fields)
}
