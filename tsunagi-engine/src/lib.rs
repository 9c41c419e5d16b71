//! Tsunagi デバッグエンジン境界
//!
//! このクレートは、デバッグエンジン（スレッドの停止、ブレークポイント要求の登録、
//! 式のコンパイルと評価）とやり取りするための型とトレイトを提供します。
//! 実際のエンジンは外部コンポーネントであり、ここではその契約だけを定義します。
//! テストやCLIのために、メモリ上で動作する模擬デバッギ `MockEngine` も含みます。

pub mod value;
pub mod thread;
pub mod breakpoint;
pub mod engine;
pub mod error;
pub mod session;
pub mod mock;

pub use value::{ObjectId, ObjectRef, PrimitiveValue, Value};
pub use thread::{FrameId, Location, MethodRef, StackFrame, ThreadId, Variable};
pub use breakpoint::{
    BreakpointHandler, BreakpointRequest, ClassPattern, HitDecision, MethodBreakpointSpec,
    RequestId,
};
pub use engine::{DebugEngine, EvaluationContext, Evaluator};
pub use error::EngineError;
pub use session::{Session, SessionData, SessionId};
pub use mock::{MockEngine, MockObject};

/// エンジン操作の結果型
pub type Result<T> = anyhow::Result<T>;
