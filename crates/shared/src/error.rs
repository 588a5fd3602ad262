//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum PlatformError {
    // ==================== 传输错误 ====================
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    // ==================== 外部服务错误 ====================
    #[error("Firestore 错误: status={status}, {message}")]
    Firestore { status: u16, message: String },

    #[error("FCM 错误: status={status}, {message}")]
    Fcm { status: u16, message: String },

    #[error("获取访问令牌失败: {0}")]
    Auth(String),

    // ==================== 数据错误 ====================
    #[error("响应解析失败: {0}")]
    Decode(String),

    #[error("无效的参数: {0}")]
    InvalidArgument(String),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, PlatformError>;

impl PlatformError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "HTTP_ERROR",
            Self::Firestore { .. } => "FIRESTORE_ERROR",
            Self::Fcm { .. } => "FCM_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Decode(_) => "DECODE_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 本服务自身不做重试，该判断供托管平台日志排查与告警分级使用。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Firestore { status, .. } | Self::Fcm { status, .. } => {
                *status == 429 || *status >= 500
            }
            Self::Auth(_) => true,
            _ => false,
        }
    }
}

#[derive(serde::Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(serde::Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// 从 Google API 错误响应体中提取可读信息
///
/// 标准格式为 `{"error": {"code", "message", "status"}}`，runQuery 等流式接口
/// 会包装成单元素数组；都无法解析时返回原始响应体。
pub(crate) fn google_api_message(body: &str) -> String {
    let envelope = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .map(|value| match value {
            serde_json::Value::Array(items) => items.into_iter().next().unwrap_or_default(),
            other => other,
        })
        .and_then(|value| serde_json::from_value::<GoogleErrorEnvelope>(value).ok());

    match envelope {
        Some(GoogleErrorEnvelope { error }) if !error.status.is_empty() => {
            format!("{}: {}", error.status, error.message)
        }
        Some(GoogleErrorEnvelope { error }) => error.message,
        None => body.to_string(),
    }
}
