//! スタックの記録と論理トレース

use crate::errors::ASYNC_TRACE_SEPARATOR;
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use tsunagi_engine::{DebugEngine, Location, StackFrame, ThreadId, Variable};

/// 記録されたフレーム
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub location: Location,
    /// 記録時点で見えていた変数
    pub variables: Vec<Variable>,
}

impl fmt::Display for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)
    }
}

/// 記録されたスタック（内側から外側の順）
///
/// 一度記録したら変更しません。クローンは参照の複製だけです。
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedStack {
    frames: Arc<[CapturedFrame]>,
}

impl CapturedStack {
    /// フレーム列からスタックを作成する
    pub fn new(frames: Vec<CapturedFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// 全てのフレームを取得する
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// スタックが空かどうか
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// スタックの深さ
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// 同じ記録を共有しているかどうか
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }
}

/// 停止中スレッドのスタックを記録する
#[derive(Debug, Clone)]
pub struct StackSnapshotter {
    max_depth: usize,
    capture_variables: bool,
}

impl StackSnapshotter {
    /// 記録器を作成する（深さは最低1）
    pub fn new(max_depth: usize, capture_variables: bool) -> Self {
        Self {
            max_depth: max_depth.max(1),
            capture_variables,
        }
    }

    /// 記録する最大の深さ
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// スレッドのフレームを実体化して記録する
    pub fn capture(&self, engine: &dyn DebugEngine, thread: ThreadId) -> Result<CapturedStack> {
        let frames = engine.force_frames(thread)?;
        Ok(self.snapshot(engine, &frames))
    }

    /// 実体化済みのフレームを記録する
    ///
    /// 内側のフレームを優先し、最大の深さを超える外側のフレームは切り捨てます。
    pub fn snapshot(&self, engine: &dyn DebugEngine, frames: &[StackFrame]) -> CapturedStack {
        let frames = frames
            .iter()
            .take(self.max_depth)
            .map(|frame| CapturedFrame {
                location: frame.location.clone(),
                variables: self.variables_of(engine, frame),
            })
            .collect();
        CapturedStack::new(frames)
    }

    fn variables_of(&self, engine: &dyn DebugEngine, frame: &StackFrame) -> Vec<Variable> {
        if !self.capture_variables {
            return Vec::new();
        }
        engine.visible_variables(frame).unwrap_or_else(|e| {
            debug!("unable to read variables of {}: {}", frame.location, e);
            Vec::new()
        })
    }
}

/// 現在のスタックと記録済みスタックをつないだ論理トレース
#[derive(Debug, Clone)]
pub struct LogicalTrace {
    /// 現在のスタック（内側から、インサートポイントのフレームまで）
    pub live: Vec<StackFrame>,
    /// つながった記録済みスタック
    pub captured: Option<CapturedStack>,
}

impl LogicalTrace {
    /// 全体の深さ
    pub fn depth(&self) -> usize {
        self.live.len() + self.captured.as_ref().map_or(0, CapturedStack::depth)
    }

    /// 表示用の行を作る
    pub fn render(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .live
            .iter()
            .map(|frame| format!("  {}", frame.location))
            .collect();
        if let Some(captured) = &self.captured {
            lines.push(format!("  {}", ASYNC_TRACE_SEPARATOR));
            lines.extend(captured.frames().iter().map(|frame| format!("  {}", frame)));
        }
        lines
    }
}
