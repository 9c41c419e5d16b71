//! Tsunagi の中核機能
//!
//! 非同期の境界（コールバックの実行、スレッドの受け渡し、キューに積まれた継続）を
//! またいで、論理的な呼び出しの連鎖をつなぎ合わせます。
//! キャプチャポイントでスタックを記録し、インサートポイントで同じキーを
//! 再計算して、記録済みのスタックを現在のスタックに接続します。

pub mod breakpoint;
pub mod capture_point;
pub mod command;
pub mod config;
pub mod debugger;
pub mod errors;
pub mod evaluator;
pub mod key;
pub mod parse;
pub mod registry;
pub mod snapshot;
pub mod store;

pub use breakpoint::StackCapturingBreakpoint;
pub use capture_point::{CapturePointConfig, CapturePointSettings};
pub use command::{Command, ValueSpec};
pub use config::CorrelationConfig;
pub use debugger::Debugger;
pub use evaluator::{EvaluatorCache, KeyEvaluator};
pub use key::CorrelationKey;
pub use parse::DefinitionError;
pub use registry::CaptureRegistry;
pub use snapshot::{CapturedFrame, CapturedStack, LogicalTrace, StackSnapshotter};
pub use store::CorrelationStore;

// 他のクレートから使用するために再エクスポート
pub use tsunagi_engine::{DebugEngine, MockEngine, Session, StackFrame, ThreadId, Value};

/// 中核機能の結果型
pub type Result<T> = anyhow::Result<T>;
