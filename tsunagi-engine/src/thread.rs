//! スレッドとスタックフレーム

use crate::Value;
use std::fmt;

/// スレッドID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// フレームID
///
/// エンジンが払い出す識別子で、スレッドが再開されると無効になります。
pub type FrameId = u64;

/// メソッド（解決候補）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub declaring_type: String,
    pub name: String,
    /// JVM形式などのシグネチャ文字列
    pub signature: String,
}

impl MethodRef {
    /// メソッドを作成する
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }
}

/// コード位置
///
/// 評価器キャッシュのキーにもなるため、Hash と Eq を実装します。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub declaring_type: String,
    pub method: String,
    pub source_path: Option<String>,
    pub line: u32,
}

impl Location {
    /// 位置を作成する
    pub fn new(declaring_type: impl Into<String>, method: impl Into<String>, line: u32) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method: method.into(),
            source_path: None,
            line,
        }
    }

    /// ソースファイルを設定する
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_path {
            Some(path) => write!(f, "{}.{}({}:{})", self.declaring_type, self.method, path, self.line),
            None => write!(f, "{}.{}(line {})", self.declaring_type, self.method, self.line),
        }
    }
}

/// 停止中スレッドのスタックフレーム
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub id: FrameId,
    pub thread: ThreadId,
    pub location: Location,
}

/// フレームから見える変数
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}
