//! 订单、用户与通知载荷
//!
//! Firestore 文档没有固定结构，这里只取通知流程实际读取的字段，
//! 订单的其余字段原样保存在 `extra` 中。

use std::collections::{BTreeMap, HashMap};

use notifier_shared::firestore::{Document, Value};
use serde::Serialize;

pub const ORDER_ID_FIELD: &str = "orderId";
pub const CUSTOMER_ID_FIELD: &str = "customerId";

/// 新订单通知标题
pub const NEW_ORDER_TITLE: &str = "New Order Received";

/// 新创建的订单
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Order {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    /// 通知流程不关心的其余字段
    pub extra: HashMap<String, Value>,
}

impl Order {
    /// 从订单文档构造
    ///
    /// 数值等非字符串字段转为文本，null 与复合类型视为缺失。
    pub fn from_document(doc: &Document) -> Self {
        let extra = doc
            .fields
            .iter()
            .filter(|(name, _)| name.as_str() != ORDER_ID_FIELD && name.as_str() != CUSTOMER_ID_FIELD)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            order_id: doc.field_string(ORDER_ID_FIELD),
            customer_id: doc.field_string(CUSTOMER_ID_FIELD),
            extra,
        }
    }
}

/// 用户记录中通知流程读取的部分
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub id: String,
    pub role: Option<String>,
    pub fcm_token: Option<String>,
}

impl User {
    /// 从用户文档构造，`role_field` 与 `token_field` 为文档中的字段名
    ///
    /// 只接受字符串类型的角色与令牌，其他类型视为缺失。
    pub fn from_document(doc: &Document, role_field: &str, token_field: &str) -> Self {
        let string_field = |name: &str| doc.field(name).and_then(Value::as_str).map(String::from);

        Self {
            id: doc.id().to_string(),
            role: string_field(role_field),
            fcm_token: string_field(token_field),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    /// 可用于推送的设备令牌，空字符串视为没有令牌
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// 一次调用中收集到的设备令牌，保持查询返回顺序
///
/// `push` 丢弃空字符串，集合中的令牌始终非空。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenSet(Vec<String>);

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !token.is_empty() {
            self.0.push(token);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for TokenSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for token in iter {
            set.push(token);
        }
        set
    }
}

/// 推送载荷，仅在一次发送期间存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// FCM 要求 data 的值全部为字符串
    pub data: BTreeMap<String, String>,
}

impl NotificationPayload {
    /// 根据新订单构造通知
    ///
    /// 订单号与客户号原样写入，缺失时为空字符串。
    pub fn for_order(order: &Order) -> Self {
        let order_id = order.order_id.clone().unwrap_or_default();
        let customer_id = order.customer_id.clone().unwrap_or_default();

        Self {
            title: NEW_ORDER_TITLE.to_string(),
            body: format!("A new order has been created: {order_id}"),
            data: BTreeMap::from([
                (ORDER_ID_FIELD.to_string(), order_id),
                (CUSTOMER_ID_FIELD.to_string(), customer_id),
            ]),
        }
    }
}
