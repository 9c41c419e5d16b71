//! スタックを記録するブレークポイント
//!
//! キャプチャ側のメソッドに停止しないブレークポイントを張り、ヒットのたびに
//! キーを評価してスタックを記録します。インサート側は問い合わせ時に
//! 同じキーを再計算して、記録済みのスタックを探します。

use crate::errors;
use crate::{
    CapturePointConfig, CapturedStack, CorrelationConfig, CorrelationKey, CorrelationStore,
    KeyEvaluator, Result, StackSnapshotter,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};
use tsunagi_engine::{
    BreakpointHandler, ClassPattern, DebugEngine, EngineError, EvaluationContext, HitDecision,
    Location, MethodBreakpointSpec, RequestId, Session, StackFrame, ThreadId,
};

/// 1つのキャプチャポイントに対応するブレークポイント
pub struct StackCapturingBreakpoint {
    config: CapturePointConfig,
    capture_class: ClassPattern,
    insert_class: ClassPattern,
    capture_evaluator: KeyEvaluator,
    insert_evaluator: KeyEvaluator,
    snapshotter: StackSnapshotter,
    /// セッションより長生きしないように弱参照で持つ
    session: Weak<Session>,
    request: Mutex<Option<RequestId>>,
}

impl StackCapturingBreakpoint {
    /// ブレークポイントを作成する（エンジンへの登録はまだ行わない）
    pub fn new(
        session: &Arc<Session>,
        config: CapturePointConfig,
        correlation: &CorrelationConfig,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            capture_class: ClassPattern::new(&config.capture_class_pattern)?,
            insert_class: ClassPattern::new(&config.insert_class_pattern)?,
            capture_evaluator: KeyEvaluator::new(&config.capture_key_expr),
            insert_evaluator: KeyEvaluator::new(&config.insert_key_expr),
            snapshotter: StackSnapshotter::new(
                correlation.max_stack_length,
                correlation.capture_variables,
            ),
            session: Arc::downgrade(session),
            request: Mutex::new(None),
            config,
        }))
    }

    fn request(&self) -> MutexGuard<'_, Option<RequestId>> {
        self.request.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// キャプチャポイントの設定
    pub fn config(&self) -> &CapturePointConfig {
        &self.config
    }

    /// エンジンに登録済みの要求ID
    pub fn request_id(&self) -> Option<RequestId> {
        *self.request()
    }

    /// エンジンに要求を登録する
    ///
    /// キャプチャ側のクラスが空の場合は登録しません（インサート側の照合にだけ使われます）。
    /// 登録した要求がまだどのメソッドにも解決されていない場合は `false` を返します。
    pub fn create_request(self: &Arc<Self>, engine: &dyn DebugEngine) -> Result<bool> {
        if self.capture_class.is_empty() {
            return Ok(true);
        }
        let mut request = self.request();
        if request.is_some() {
            return Ok(true);
        }

        let spec = MethodBreakpointSpec::non_suspending(
            self.capture_class.clone(),
            self.config.capture_method_pattern.clone(),
        );
        let handler: Arc<dyn BreakpointHandler> = Arc::clone(self) as Arc<dyn BreakpointHandler>;
        let registered = engine.register_method_breakpoint(spec, handler)?;
        *request = Some(registered.id);
        Ok(!registered.resolved.is_empty())
    }

    /// エンジンから要求を削除する（何度呼んでもよい）
    pub fn delete_request(&self, engine: &dyn DebugEngine) {
        if let Some(id) = self.request().take() {
            if let Err(e) = engine.delete_request(id) {
                debug!("failed to delete request {}: {}", id, e);
            }
        }
    }

    /// 評価器キャッシュを破棄する
    pub fn clear_caches(&self) {
        self.capture_evaluator.clear_cache();
        self.insert_evaluator.clear_cache();
    }

    /// 位置がインサートポイントにマッチするか
    pub fn matches_insert(&self, location: &Location) -> bool {
        (self.insert_class.is_empty() || self.insert_class.matches(&location.declaring_type))
            && self.config.insert_method_pattern == location.method
    }

    /// キャプチャ側のヒットを処理する
    ///
    /// スタックを記録した場合は `true` を返します。
    pub fn capture(&self, session: &Session, thread: ThreadId) -> Result<bool> {
        let engine = session.engine();
        if !engine.supports_force_frames() {
            trace!("target cannot force frames, skipping {}", self);
            return Ok(false);
        }
        let frames = engine.force_frames(thread)?;
        let Some(top) = frames.first() else {
            return Ok(false);
        };

        let context = EvaluationContext::new(thread, top.clone());
        let value = self.capture_evaluator.evaluate(engine, &context)?;
        let Some(key) = value
            .map(|v| CorrelationKey::derive(engine, &v))
            .transpose()?
            .flatten()
        else {
            return Ok(false);
        };

        // セッション終了後はストアが存在しない
        let Some(store) = session.data().get::<CorrelationStore>() else {
            return Ok(false);
        };
        let stack = self.snapshotter.snapshot(engine, &frames);
        debug!("captured {} frames for key {}", stack.depth(), key);
        store.put(key, stack);
        Ok(true)
    }

    /// インサート側のフレームに対応するキーを計算する
    pub fn insert_key(&self, session: &Session, frame: &StackFrame) -> Result<Option<CorrelationKey>> {
        let engine = session.engine();
        let context = EvaluationContext::new(frame.thread, frame.clone());
        let value = self.insert_evaluator.evaluate(engine, &context)?;
        Ok(value
            .map(|v| CorrelationKey::derive(engine, &v))
            .transpose()?
            .flatten())
    }

    /// インサート側のフレームから記録済みスタックを探す
    ///
    /// 評価の失敗はコンソールに報告し、`None` を返します。
    /// スレッド状態の競合による失敗は報告しません。
    pub fn related_stack(
        &self,
        session: &Session,
        store: &CorrelationStore,
        frame: &StackFrame,
    ) -> Option<CapturedStack> {
        match self.insert_key(session, frame) {
            Ok(key) => key.and_then(|k| store.get(&k)),
            Err(e) => {
                debug!("insert evaluation failed at {}: {:#}", frame.location, e);
                if !EngineError::is_thread_state_race(&e) {
                    session
                        .engine()
                        .print_to_console(&errors::insert_evaluation_failed(&e.to_string()));
                }
                None
            }
        }
    }
}

impl BreakpointHandler for StackCapturingBreakpoint {
    fn on_hit(&self, thread: ThreadId) -> HitDecision {
        let Some(session) = self.session.upgrade() else {
            return HitDecision::Resume;
        };
        if session.is_closed() {
            return HitDecision::Resume;
        }

        if let Err(e) = self.capture(&session, thread) {
            debug!("capture at {} failed: {:#}", self, e);
            // 非対応のターゲットとスレッド状態の競合は報告しない
            if !EngineError::is_unsupported(&e) && !EngineError::is_thread_state_race(&e) {
                session
                    .engine()
                    .print_to_console(&errors::capture_evaluation_failed(&e.to_string()));
            }
        }

        // 記録するだけで、スレッドは止めない
        HitDecision::Resume
    }
}

impl fmt::Display for StackCapturingBreakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Capture point at {}.{}",
            self.config.capture_class_pattern, self.config.capture_method_pattern
        )
    }
}
