//! 評価結果の値とオブジェクトハンドル

use std::fmt;

/// デバッギ内オブジェクトのID
///
/// エンジンが払い出すハンドルの同一性そのものです。
/// 同じIDは同じオブジェクトインスタンスを指します。
pub type ObjectId = u64;

/// オブジェクトへのハンドル
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: ObjectId,
    /// 実行時の型名
    pub runtime_type: String,
}

impl ObjectRef {
    /// 新しいハンドルを作成する
    pub fn new(id: ObjectId, runtime_type: impl Into<String>) -> Self {
        Self {
            id,
            runtime_type: runtime_type.into(),
        }
    }
}

/// プリミティブ値
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Char(char),
    Int(i64),
    Float(f64),
}

/// 式の評価結果
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// null 参照
    Null,
    /// 戻り値なし
    Void,
    /// プリミティブ値
    Primitive(PrimitiveValue),
    /// オブジェクトハンドル
    Object(ObjectRef),
}

impl Value {
    /// オブジェクトハンドルであれば取得する
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// 整数値を作成する
    pub fn int(v: i64) -> Self {
        Value::Primitive(PrimitiveValue::Int(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Void => write!(f, "void"),
            Value::Primitive(PrimitiveValue::Boolean(b)) => write!(f, "{}", b),
            Value::Primitive(PrimitiveValue::Char(c)) => write!(f, "'{}'", c),
            Value::Primitive(PrimitiveValue::Int(i)) => write!(f, "{}", i),
            Value::Primitive(PrimitiveValue::Float(x)) => write!(f, "{}", x),
            Value::Object(obj) => write!(f, "{}@{}", obj.runtime_type, obj.id),
        }
    }
}
