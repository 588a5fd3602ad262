//! Firestore 文档
//!
//! 文档资源名形如 `projects/{p}/databases/{d}/documents/{collection}/{id}`，
//! 事件主题中使用其相对形式 `documents/{collection}/{id}`。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::value::Value;

const DOCUMENTS_SEGMENT: &str = "documents/";

/// Firestore 文档
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// 文档 ID（资源名最后一段）
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// 字段的文本表示，缺失或不可展示时为 None
    pub fn field_string(&self, name: &str) -> Option<String> {
        self.field(name).and_then(Value::to_display_string)
    }
}

/// 文档路径中 `documents/` 之后的相对部分
///
/// 同时接受完整资源名与事件主题两种形式；不含 `documents/` 时原样返回。
pub fn relative_path(name: &str) -> &str {
    if let Some(rest) = name.strip_prefix(DOCUMENTS_SEGMENT) {
        return rest;
    }
    match name.find(&format!("/{DOCUMENTS_SEGMENT}")) {
        Some(idx) => &name[idx + 1 + DOCUMENTS_SEGMENT.len()..],
        None => name,
    }
}

/// 解析顶层集合中的文档路径，返回 (集合 ID, 文档 ID)
///
/// 子集合中的文档（如 `orders/o1/items/i1`）不属于任何顶层集合，返回 None。
pub fn top_level_document(name: &str) -> Option<(&str, &str)> {
    let mut segments = relative_path(name).split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(collection), Some(id), None) if !collection.is_empty() && !id.is_empty() => {
            Some((collection, id))
        }
        _ => None,
    }
}
