//! FCM HTTP v1 客户端
//!
//! v1 接口每次请求只投递一个令牌，多播由客户端按令牌逐个发送后汇总，
//! 请求并发数受 `max_concurrency` 限制。单个令牌的失败记录在结果中而不中断整体发送，
//! 只有获取访问令牌失败等整体性错误才会作为错误返回。

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::auth::AccessTokenProvider;
use crate::config::FcmConfig;
use crate::error::{PlatformError, Result, google_api_message};

/// 通知栏展示内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// 单个令牌的投递结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub token: String,
    pub success: bool,
    /// FCM 返回的消息资源名，用于追踪投递状态
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// 多播汇总结果，responses 与请求令牌一一对应且顺序一致
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    name: String,
}

/// FCM HTTP v1 客户端
#[derive(Clone)]
pub struct FcmClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    dry_run: bool,
    max_concurrency: usize,
    auth: Arc<dyn AccessTokenProvider>,
}

impl FcmClient {
    pub fn new(
        http: reqwest::Client,
        config: &FcmConfig,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        if config.project_id.is_empty() {
            return Err(PlatformError::InvalidArgument(
                "FCM project_id 不能为空".to_string(),
            ));
        }

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            dry_run: config.dry_run,
            max_concurrency: config.max_concurrency.max(1),
            auth,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoint, self.project_id
        )
    }

    /// 向多个设备令牌发送同一条通知
    #[instrument(skip_all, fields(token_count = tokens.len(), dry_run = self.dry_run))]
    pub async fn send_multicast(
        &self,
        tokens: &[String],
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> Result<BatchResponse> {
        if tokens.is_empty() {
            return Err(PlatformError::InvalidArgument(
                "多播令牌列表不能为空".to_string(),
            ));
        }

        // 同一批次共用一个访问令牌
        let bearer = self.auth.access_token().await?;

        // 先收集具体的 future，避免高阶闭包在 Send 约束下无法推断
        let sends: Vec<_> = tokens
            .iter()
            .map(|token| self.send_one(token, bearer.as_deref(), notification, data))
            .collect();

        let responses: Vec<SendResponse> = stream::iter(sends)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let batch = BatchResponse::from_responses(responses);
        debug!(
            success_count = batch.success_count,
            failure_count = batch.failure_count,
            "FCM 多播完成"
        );
        Ok(batch)
    }

    async fn send_one(
        &self,
        token: &str,
        bearer: Option<&str>,
        notification: &PushNotification,
        data: &BTreeMap<String, String>,
    ) -> SendResponse {
        let body = json!({
            "message": {
                "token": token,
                "notification": notification,
                "data": data,
            },
            "validate_only": self.dry_run,
        });

        let mut request = self.http.post(self.send_url()).json(&body);
        if let Some(bearer) = bearer {
            request = request.bearer_auth(bearer);
        }

        match self.execute(request).await {
            Ok(message_id) => SendResponse {
                token: token.to_string(),
                success: true,
                message_id: Some(message_id),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "FCM 单令牌投递失败");
                SendResponse {
                    token: token.to_string(),
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlatformError::Fcm {
                status: status.as_u16(),
                message: google_api_message(&text),
            });
        }

        let sent: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(format!("FCM 响应解析失败: {e}")))?;
        Ok(sent.name)
    }
}
