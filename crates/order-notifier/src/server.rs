//! CloudEvent 接收端
//!
//! 托管平台把 Firestore 事件以 HTTP POST 投递到根路径。
//! 2xx 表示事件已处理（或确认忽略），5xx 交由平台按其重试策略重投。

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    Extension,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use notifier_shared::observability::middleware::{self as obs_middleware, RequestId};
use notifier_shared::observability::metrics;
use serde_json::json;
use tracing::{Instrument, error, info, info_span};

use crate::error::OrderNotifierError;
use crate::event::{self, TriggerEvent};
use crate::handler::{DispatchOutcome, OrderNotifier};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<OrderNotifier>,
    pub orders_collection: String,
    pub service_name: String,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(receive_event))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

async fn receive_event(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = info_span!("order_event", request_id = %request_id.as_str());
    process_event(&state, &headers, &body).instrument(span).await
}

async fn process_event(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    let start = Instant::now();

    let result = match event::decode(headers, body, &state.orders_collection) {
        Ok(TriggerEvent::OrderCreated(created)) => state.notifier.handle(&created).await,
        Ok(TriggerEvent::Ignored { reason }) => {
            info!(reason = %reason, "忽略事件");
            metrics::record_order_event("ignored", start.elapsed().as_secs_f64());
            return (StatusCode::ACCEPTED, Json(json!({"status": "ignored"}))).into_response();
        }
        Err(e) => {
            metrics::record_order_event("invalid", start.elapsed().as_secs_f64());
            Err(e)
        }
    };

    match result {
        Ok(DispatchOutcome::NoRecipients) => {
            Json(json!({"status": "no_recipients"})).into_response()
        }
        Ok(DispatchOutcome::Dispatched(response)) => Json(json!({
            "status": "dispatched",
            "successCount": response.success_count,
            "failureCount": response.failure_count,
        }))
        .into_response(),
        Err(e) => {
            log_failure(&e);
            e.into_response()
        }
    }
}

fn log_failure(err: &OrderNotifierError) {
    match err {
        OrderNotifierError::InvalidEvent(_) => {
            error!(code = err.code(), error = %err, "事件无效，丢弃")
        }
        OrderNotifierError::UserQuery(source) | OrderNotifierError::Dispatch(source) => error!(
            code = err.code(),
            retryable = source.is_retryable(),
            error = %err,
            "订单通知处理失败"
        ),
    }
}

/// 存活探针
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": state.service_name,
    }))
}
