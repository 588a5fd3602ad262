//! Firestore 类型化值的 JSON 编码
//!
//! REST API 中每个字段值都是只含一个键的对象，键名即类型，
//! 如 `{"stringValue": "o1"}`、`{"integerValue": "42"}`。
//! 外部标签枚举与该编码一一对应。

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Firestore 字段值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// 取值为 `"NULL_VALUE"` 或 JSON null，内容无意义
    NullValue(Option<String>),
    BooleanValue(bool),
    /// int64 在 JSON 中以字符串传输，兼容部分实现直接输出数字
    #[serde(
        serialize_with = "serialize_int64",
        deserialize_with = "deserialize_int64"
    )]
    IntegerValue(i64),
    DoubleValue(f64),
    /// RFC 3339 时间戳
    TimestampValue(String),
    StringValue(String),
    /// base64 编码的字节
    BytesValue(String),
    /// 文档资源名
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl Value {
    /// 字符串值的借用视图，其他类型返回 None
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::StringValue(s) => Some(s),
            _ => None,
        }
    }

    /// 标量值的文本表示
    ///
    /// 数值、布尔、时间戳等按字面量转换；null、数组、映射等无法直接展示的类型返回 None。
    pub fn to_display_string(&self) -> Option<String> {
        match self {
            Self::StringValue(s)
            | Self::TimestampValue(s)
            | Self::ReferenceValue(s)
            | Self::BytesValue(s) => Some(s.clone()),
            Self::IntegerValue(i) => Some(i.to_string()),
            Self::DoubleValue(d) => Some(d.to_string()),
            Self::BooleanValue(b) => Some(b.to_string()),
            Self::NullValue(_) | Self::GeoPointValue(_) | Self::ArrayValue(_) | Self::MapValue(_) => {
                None
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::StringValue(value.to_string())
    }
}

fn serialize_int64<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

fn deserialize_int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64Repr {
        Text(String),
        Number(i64),
    }

    match Int64Repr::deserialize(deserializer)? {
        Int64Repr::Number(n) => Ok(n),
        Int64Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: serde_json::Value) -> Value {
        serde_json::from_value(v).expect("解码 Firestore 值失败")
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode(json!({"stringValue": "o1"})), Value::from("o1"));
        assert_eq!(decode(json!({"booleanValue": true})), Value::BooleanValue(true));
        assert_eq!(decode(json!({"integerValue": "42"})), Value::IntegerValue(42));
        assert_eq!(decode(json!({"integerValue": 7})), Value::IntegerValue(7));
        assert_eq!(decode(json!({"doubleValue": 1.5})), Value::DoubleValue(1.5));
        assert!(matches!(decode(json!({"nullValue": null})), Value::NullValue(_)));
        assert!(matches!(
            decode(json!({"nullValue": "NULL_VALUE"})),
            Value::NullValue(_)
        ));
    }

    #[test]
    fn test_decode_invalid_integer_fails() {
        let result: Result<Value, _> = serde_json::from_value(json!({"integerValue": "abc"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_nested_map_and_array() {
        let value = decode(json!({
            "mapValue": {
                "fields": {
                    "items": {"arrayValue": {"values": [
                        {"stringValue": "sku-1"},
                        {"integerValue": "2"}
                    ]}},
                    "location": {"geoPointValue": {"latitude": 31.2, "longitude": 121.5}}
                }
            }
        }));

        let Value::MapValue(map) = value else {
            panic!("应解码为 mapValue");
        };
        let Some(Value::ArrayValue(items)) = map.fields.get("items") else {
            panic!("items 应为 arrayValue");
        };
        assert_eq!(items.values.len(), 2);
        assert_eq!(items.values[0].as_str(), Some("sku-1"));
        assert!(matches!(
            map.fields.get("location"),
            Some(Value::GeoPointValue(_))
        ));
    }

    #[test]
    fn test_empty_array_and_map_default() {
        let Value::ArrayValue(array) = decode(json!({"arrayValue": {}})) else {
            panic!("应解码为 arrayValue");
        };
        assert!(array.values.is_empty());

        let Value::MapValue(map) = decode(json!({"mapValue": {}})) else {
            panic!("应解码为 mapValue");
        };
        assert!(map.fields.is_empty());
    }

    #[test]
    fn test_encode_uses_firestore_wire_format() {
        assert_eq!(
            serde_json::to_value(Value::from("employee")).unwrap(),
            json!({"stringValue": "employee"})
        );
        assert_eq!(
            serde_json::to_value(Value::IntegerValue(9)).unwrap(),
            json!({"integerValue": "9"})
        );
    }

    #[test]
    fn test_to_display_string() {
        assert_eq!(Value::from("c1").to_display_string().as_deref(), Some("c1"));
        assert_eq!(
            Value::IntegerValue(1001).to_display_string().as_deref(),
            Some("1001")
        );
        assert_eq!(
            Value::BooleanValue(false).to_display_string().as_deref(),
            Some("false")
        );
        assert!(Value::NullValue(None).to_display_string().is_none());
        assert!(
            Value::MapValue(MapValue::default())
                .to_display_string()
                .is_none()
        );
    }
}
