//! Firestore REST 客户端
//!
//! 只实现订单通知需要的只读查询：在某个集合中按字段等值过滤并取回全部文档。
//! 不做分页，调用方假定结果集可一次装入内存。

pub mod document;
pub mod value;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::auth::{self, AccessTokenProvider};
use crate::config::FirestoreConfig;
use crate::error::{PlatformError, Result, google_api_message};

pub use document::Document;
pub use value::Value;

/// runQuery 流式响应中的单个元素
///
/// 只有携带 document 的元素才是结果，其余仅报告 readTime 或跳过数。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryResponse {
    document: Option<Document>,
}

/// Firestore REST 客户端
#[derive(Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    database_id: String,
    auth: Arc<dyn AccessTokenProvider>,
}

impl FirestoreClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        database_id: impl Into<String>,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(PlatformError::InvalidArgument(
                "Firestore project_id 不能为空".to_string(),
            ));
        }

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id,
            database_id: database_id.into(),
            auth,
        })
    }

    pub fn from_config(
        http: reqwest::Client,
        config: &FirestoreConfig,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        Self::new(
            http,
            config.base_url(),
            config.project_id.clone(),
            config.database_id.clone(),
            auth,
        )
    }

    /// 数据库根文档路径，即 runQuery 的 parent
    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url, self.project_id, self.database_id
        )
    }

    /// 查询 `collection` 中 `field == value` 的全部文档
    ///
    /// 结果顺序即服务端返回顺序，未指定排序时不保证稳定。
    #[instrument(skip(self, value), fields(project = %self.project_id))]
    pub async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: Value,
    ) -> Result<Vec<Document>> {
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": value,
                    }
                }
            }
        });

        let request = self
            .http
            .post(format!("{}:runQuery", self.documents_url()))
            .json(&body);
        let response = auth::authorize(request, self.auth.as_ref())
            .await?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlatformError::Firestore {
                status: status.as_u16(),
                message: google_api_message(&text),
            });
        }

        let items: Vec<RunQueryResponse> = response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(format!("runQuery 响应解析失败: {e}")))?;

        let documents: Vec<Document> = items.into_iter().filter_map(|r| r.document).collect();

        debug!(collection, field, count = documents.len(), "Firestore 查询完成");
        Ok(documents)
    }
}
