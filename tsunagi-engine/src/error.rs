//! エンジンエラー

use crate::{ObjectId, RequestId, ThreadId};
use thiserror::Error;

/// デバッグエンジンが返すエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// 調べようとしたスレッドの状態が変わった（停止していない等）
    #[error("thread {0} is not in a compatible state")]
    IncompatibleThreadState(ThreadId),
    /// 式の評価に失敗した
    #[error("{0}")]
    Evaluation(String),
    /// フレームが無効になった
    #[error("invalid stack frame")]
    InvalidFrame,
    /// オブジェクトが回収済み等で無効
    #[error("invalid object id {0}")]
    InvalidObject(ObjectId),
    /// ターゲットがこの機能をサポートしていない
    #[error("operation not supported by target: {0}")]
    Unsupported(&'static str),
    /// ブレークポイント要求が存在しない
    #[error("breakpoint request {0} not found")]
    RequestNotFound(RequestId),
}

impl EngineError {
    /// スレッド状態の競合によるエラーかどうか
    ///
    /// anyhow のエラーチェーンを辿って判定します。
    pub fn is_thread_state_race(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<EngineError>(),
                Some(EngineError::IncompatibleThreadState(_))
            )
        })
    }

    /// 機能非対応によるエラーかどうか
    pub fn is_unsupported(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<EngineError>(),
                Some(EngineError::Unsupported(_))
            )
        })
    }
}
