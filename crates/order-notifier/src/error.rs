//! 订单通知错误类型
//!
//! 查询失败与发送失败都直接上抛到调用入口，本服务不做恢复，
//! 是否重投事件由托管平台的重试策略决定。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notifier_shared::error::PlatformError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderNotifierError {
    #[error("事件无效: {0}")]
    InvalidEvent(String),

    #[error("查询员工用户失败: {0}")]
    UserQuery(#[source] PlatformError),

    #[error("推送通知失败: {0}")]
    Dispatch(#[source] PlatformError),
}

impl OrderNotifierError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::UserQuery(_) => "USER_QUERY_FAILED",
            Self::Dispatch(_) => "DISPATCH_FAILED",
        }
    }

    /// 返回对应的 HTTP 状态码
    ///
    /// 无效事件重投也不会成功，返回 4xx；其余返回 5xx 交由平台决定是否重试。
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            Self::UserQuery(_) | Self::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrderNotifierError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        (self.status_code(), axum::Json(body)).into_response()
    }
}
