//! 相関キー

use crate::Result;
use std::fmt;
use tsunagi_engine::{DebugEngine, ObjectId, ObjectRef, Value};

/// キャプチャとインサートを結びつけるキー
///
/// 文字列オブジェクトは内容で、それ以外のオブジェクトはハンドルの同一性で比較します。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// 文字列の内容
    Text(String),
    /// オブジェクトの同一性
    Object(ObjectId),
}

impl CorrelationKey {
    /// 評価結果からキーを導出する
    ///
    /// null やプリミティブ値からはキーを作りません（`None`）。
    pub fn derive(engine: &dyn DebugEngine, value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Object(obj) => Self::from_object(engine, obj).map(Some),
            _ => Ok(None),
        }
    }

    /// オブジェクトハンドルからキーを導出する
    pub fn from_object(engine: &dyn DebugEngine, object: &ObjectRef) -> Result<Self> {
        Ok(match engine.string_value(object)? {
            Some(text) => CorrelationKey::Text(text),
            None => CorrelationKey::Object(object.id),
        })
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKey::Text(text) => write!(f, "\"{}\"", text),
            CorrelationKey::Object(id) => write!(f, "@{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsunagi_engine::MockEngine;

    #[test]
    fn test_equal_text_correlates() {
        let engine = MockEngine::new();
        let a = Value::Object(engine.new_string("order-17"));
        let b = Value::Object(engine.new_string("order-17"));

        let ka = CorrelationKey::derive(&engine, &a).unwrap();
        let kb = CorrelationKey::derive(&engine, &b).unwrap();
        assert_eq!(ka, Some(CorrelationKey::Text("order-17".to_string())));
        assert_eq!(ka, kb);
    }

    #[test]
    fn test_distinct_objects_never_correlate() {
        let engine = MockEngine::new();
        let a = engine.new_object("app.Job");
        let b = engine.new_object("app.Job");
        engine.set_field(&a, "id", Value::int(1));
        engine.set_field(&b, "id", Value::int(1));

        let ka = CorrelationKey::derive(&engine, &Value::Object(a.clone())).unwrap();
        let kb = CorrelationKey::derive(&engine, &Value::Object(b)).unwrap();
        assert_ne!(ka, kb);

        let again = CorrelationKey::derive(&engine, &Value::Object(a)).unwrap();
        assert_eq!(ka, again);
    }

    #[test]
    fn test_no_key_for_null_and_primitives() {
        let engine = MockEngine::new();
        assert_eq!(CorrelationKey::derive(&engine, &Value::Null).unwrap(), None);
        assert_eq!(CorrelationKey::derive(&engine, &Value::Void).unwrap(), None);
        assert_eq!(CorrelationKey::derive(&engine, &Value::int(42)).unwrap(), None);
    }

    #[test]
    fn test_collected_object_is_an_error() {
        let engine = MockEngine::new();
        let ghost = ObjectRef::new(999, "app.Job");
        assert!(CorrelationKey::derive(&engine, &Value::Object(ghost)).is_err());
    }
}
