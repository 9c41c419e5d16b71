//! デバッグエンジンの契約

use crate::{
    BreakpointHandler, BreakpointRequest, Location, MethodBreakpointSpec, ObjectRef, RequestId,
    Result, StackFrame, ThreadId, Value, Variable,
};
use std::sync::Arc;

/// 式評価のコンテキスト（停止中スレッドとフレーム）
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub thread: ThreadId,
    pub frame: StackFrame,
}

impl EvaluationContext {
    /// コンテキストを作成する
    pub fn new(thread: ThreadId, frame: StackFrame) -> Self {
        Self { thread, frame }
    }

    /// フレームの位置を取得する
    pub fn location(&self) -> &Location {
        &self.frame.location
    }
}

/// コンパイル済みの式評価器
pub trait Evaluator: Send + Sync {
    /// 与えられたコンテキストで評価する
    fn evaluate(&self, engine: &dyn DebugEngine, context: &EvaluationContext) -> Result<Value>;
}

/// デバッグエンジン
///
/// ブレークポイント要求の登録・削除と構成の同期は、エンジンの単一の
/// コマンドコンテキスト（マネージャ）上で直列に実行されます。
/// 一方ヒットの処理は複数のデバッギスレッドから並行に届きます。
pub trait DebugEngine: Send + Sync {
    /// 停止しないメソッドブレークポイントを登録する
    fn register_method_breakpoint(
        &self,
        spec: MethodBreakpointSpec,
        handler: Arc<dyn BreakpointHandler>,
    ) -> Result<BreakpointRequest>;

    /// ブレークポイント要求を削除する
    fn delete_request(&self, id: RequestId) -> Result<()>;

    /// スタックフレームの強制取得をサポートしているか
    fn supports_force_frames(&self) -> bool;

    /// 停止中スレッドのフレームを内側から順に実体化する
    fn force_frames(&self, thread: ThreadId) -> Result<Vec<StackFrame>>;

    /// フレームの引数値を取得する
    fn argument_values(&self, frame: &StackFrame) -> Result<Vec<Value>>;

    /// フレームから見える変数を取得する
    fn visible_variables(&self, frame: &StackFrame) -> Result<Vec<Variable>>;

    /// 式をコンパイルする
    ///
    /// セッションのシンボル状態に一貫してアクセスする必要があるため、
    /// エンジンの同期コンテキストで実行されます。
    fn compile_expression(&self, expression: &str, location: &Location)
        -> Result<Arc<dyn Evaluator>>;

    /// オブジェクトが文字列であれば内容を取得する
    fn string_value(&self, object: &ObjectRef) -> Result<Option<String>>;

    /// コードの世代番号（リロードのたびに増える）
    fn code_generation(&self) -> u64;

    /// 現在マネージャコンテキスト上で実行中かどうか
    fn is_manager_context(&self) -> bool {
        true
    }

    /// オペレータのコンソールにメッセージを出力する
    fn print_to_console(&self, message: &str);
}
