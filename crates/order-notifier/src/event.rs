//! 触发事件解码
//!
//! Firestore 文档事件以 CloudEvent 形式通过 HTTP 投递，数据部分为 JSON 编码的
//! `DocumentEventData`。支持两种内容模式：
//! - binary：元数据在 `ce-*` 请求头中，请求体即数据；
//! - structured：`application/cloudevents+json`，元数据与 `data` 同在请求体中。

use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use chrono::{DateTime, Utc};
use notifier_shared::firestore::Document;
use notifier_shared::firestore::document::top_level_document;
use serde::Deserialize;

use crate::error::OrderNotifierError;
use crate::models::Order;

/// Firestore 文档创建事件类型
pub const DOCUMENT_CREATED: &str = "google.cloud.firestore.document.v1.created";

const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// CloudEvent 元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub id: Option<String>,
    pub event_type: String,
    /// 形如 `documents/orders/{id}`
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

/// 文档事件数据
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEventData {
    /// 变更后的文档，创建事件中必定存在
    pub value: Option<Document>,
}

/// structured 模式的请求体
#[derive(Debug, Deserialize)]
struct StructuredEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    subject: Option<String>,
    time: Option<String>,
    data: Option<DocumentEventData>,
}

/// 订单创建事件
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCreatedEvent {
    pub event_id: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    /// 订单文档的资源名
    pub document_name: String,
    pub order: Order,
}

/// 解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    OrderCreated(OrderCreatedEvent),
    /// 不属于本服务处理范围的事件，确认接收但不处理
    Ignored { reason: String },
}

/// 从 HTTP 请求头和请求体解码触发事件
///
/// `orders_collection` 之外的文档事件与非创建事件都返回 `Ignored`。
pub fn decode(
    headers: &HeaderMap,
    body: &[u8],
    orders_collection: &str,
) -> Result<TriggerEvent, OrderNotifierError> {
    let (meta, data) = if is_structured(headers) {
        decode_structured(body)?
    } else {
        decode_binary(headers, body)?
    };

    if meta.event_type != DOCUMENT_CREATED {
        return Ok(TriggerEvent::Ignored {
            reason: format!("不处理的事件类型: {}", meta.event_type),
        });
    }

    let path = meta
        .subject
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OrderNotifierError::InvalidEvent("缺少事件 subject".to_string()))?;

    let document = data
        .and_then(|d| d.value)
        .ok_or_else(|| OrderNotifierError::InvalidEvent("事件数据缺少 value 文档".to_string()))?;

    match top_level_document(&path) {
        Some((collection, _)) if collection == orders_collection => {}
        _ => {
            return Ok(TriggerEvent::Ignored {
                reason: format!("非 {orders_collection} 集合的文档: {path}"),
            });
        }
    }

    Ok(TriggerEvent::OrderCreated(OrderCreatedEvent {
        event_id: meta.id,
        event_time: meta.time,
        document_name: document.name.clone(),
        order: Order::from_document(&document),
    }))
}

fn is_structured(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(STRUCTURED_CONTENT_TYPE))
}

fn decode_binary(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(EventMeta, Option<DocumentEventData>), OrderNotifierError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    let event_type = header("ce-type")
        .ok_or_else(|| OrderNotifierError::InvalidEvent("缺少 ce-type 请求头".to_string()))?;

    let meta = EventMeta {
        id: header("ce-id"),
        event_type,
        subject: header("ce-subject"),
        time: header("ce-time").as_deref().and_then(parse_time),
    };

    let data = if body.is_empty() {
        None
    } else {
        Some(parse_data(body)?)
    };

    Ok((meta, data))
}

fn decode_structured(
    body: &[u8],
) -> Result<(EventMeta, Option<DocumentEventData>), OrderNotifierError> {
    let event: StructuredEvent = serde_json::from_slice(body)
        .map_err(|e| OrderNotifierError::InvalidEvent(format!("CloudEvent 解析失败: {e}")))?;

    let meta = EventMeta {
        id: event.id,
        event_type: event.event_type,
        subject: event.subject,
        time: event.time.as_deref().and_then(parse_time),
    };

    Ok((meta, event.data))
}

fn parse_data(body: &[u8]) -> Result<DocumentEventData, OrderNotifierError> {
    serde_json::from_slice(body)
        .map_err(|e| OrderNotifierError::InvalidEvent(format!("事件数据解析失败: {e}")))
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
