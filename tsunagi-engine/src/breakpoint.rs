//! メソッドパターンブレークポイント

use crate::{MethodRef, Result, ThreadId};
use regex::Regex;
use std::fmt;

/// ブレークポイント要求ID
pub type RequestId = u64;

/// ハンドラの判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitDecision {
    /// スレッドを停止する
    Suspend,
    /// 停止せずに実行を継続する
    Resume,
}

/// クラス名パターン
///
/// `*` をワイルドカードとして扱います。`*` を含まない場合は完全一致です。
#[derive(Debug, Clone)]
pub struct ClassPattern {
    source: String,
    regex: Option<Regex>,
}

impl ClassPattern {
    /// パターンをコンパイルする
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        let regex = if pattern.contains('*') {
            let body = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            Some(Regex::new(&format!("^{}$", body))?)
        } else {
            None
        };

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// パターン文字列を取得する
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// パターンが空かどうか
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// クラス名がパターンにマッチするか
    pub fn matches(&self, class_name: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(class_name),
            None => self.source == class_name,
        }
    }
}

impl fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// メソッドパターンブレークポイントの定義
#[derive(Debug, Clone)]
pub struct MethodBreakpointSpec {
    pub class_pattern: ClassPattern,
    pub method_name: String,
    /// 指定された場合はシグネチャも完全一致が必要
    pub signature: Option<String>,
}

impl MethodBreakpointSpec {
    /// 停止しないメソッドブレークポイントを作成する
    ///
    /// 停止するかどうかはヒットごとにハンドラが決めます。
    pub fn non_suspending(class_pattern: ClassPattern, method_name: impl Into<String>) -> Self {
        Self {
            class_pattern,
            method_name: method_name.into(),
            signature: None,
        }
    }

    /// エンジンの解決候補からメソッドを選ぶ
    ///
    /// 名前（指定があればシグネチャも）が一致する最初の1つだけを返します。
    /// 1つのパターンで捕捉されるオーバーロードは高々1つです。
    pub fn select<'a>(&self, candidates: &'a [MethodRef]) -> Option<&'a MethodRef> {
        candidates.iter().find(|m| {
            m.name == self.method_name
                && self
                    .signature
                    .as_ref()
                    .map_or(true, |sig| *sig == m.signature)
        })
    }
}

/// エンジンに登録されたブレークポイント要求
#[derive(Debug, Clone)]
pub struct BreakpointRequest {
    pub id: RequestId,
    /// 登録時点で解決できたメソッド
    pub resolved: Vec<MethodRef>,
}

/// ブレークポイントヒットのハンドラ
///
/// 複数のデバッギスレッドから同時に呼ばれることがあります。
pub trait BreakpointHandler: Send + Sync {
    /// ヒットを処理し、スレッドを停止するかどうかを返す
    fn on_hit(&self, thread: ThreadId) -> HitDecision;
}
