//! セッションごとのキャプチャポイント登録簿
//!
//! 有効なキャプチャポイントの一覧と相関ストアをセッションの拡張データとして保持し、
//! プレゼンテーション層向けの問い合わせを提供します。

use crate::errors;
use crate::{
    CapturePointConfig, CapturedStack, CorrelationConfig, CorrelationKey, CorrelationStore,
    LogicalTrace, Result, StackCapturingBreakpoint,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};
use tsunagi_engine::{DebugEngine, Session, StackFrame, ThreadId, Value};

/// 有効なブレークポイントの一覧（登録順）
type BreakpointList = Arc<Vec<Arc<StackCapturingBreakpoint>>>;

/// キャプチャポイント登録簿
pub struct CaptureRegistry {
    config: CorrelationConfig,
    /// 書き込み時に複製し、読み手はスナップショットを使う
    breakpoints: RwLock<BreakpointList>,
    /// メソッドに解決されないと報告済みの定義
    reported_unresolved: Mutex<HashSet<String>>,
}

impl CaptureRegistry {
    /// 登録簿を作成する
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            breakpoints: RwLock::new(Arc::new(Vec::new())),
            reported_unresolved: Mutex::new(HashSet::new()),
        }
    }

    /// セッションに登録簿とストアを用意する
    ///
    /// すでに用意されていれば既存の登録簿を返します。
    pub fn attach(session: &Session, config: CorrelationConfig) -> Arc<Self> {
        let capacity = config.store_capacity;
        let registry = session.data().get_or_insert_with(|| Self::new(config));
        session
            .data()
            .get_or_insert_with(|| CorrelationStore::new(capacity));
        registry
    }

    /// セッションの登録簿を取得する
    pub fn get(session: &Session) -> Option<Arc<Self>> {
        session.data().get::<Self>()
    }

    /// 設定を取得する
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// 有効なブレークポイントのスナップショット
    pub fn breakpoints(&self) -> BreakpointList {
        Arc::clone(&self.breakpoints.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn replace(&self, list: Vec<Arc<StackCapturingBreakpoint>>) -> BreakpointList {
        let mut guard = self.breakpoints.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(list))
    }

    /// どのメソッドにも解決されない定義をコンソールに報告する
    ///
    /// 同じ定義は再同期のたびに報告し直さず、一度だけ報告します。
    fn report_unresolved(&self, engine: &dyn DebugEngine, point: &CapturePointConfig) {
        let first = self
            .reported_unresolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(point.to_string());
        if first {
            warn!("{} matches no loaded method yet", point);
            engine.print_to_console(&errors::no_matching_method(
                point.capture_class_pattern.trim(),
                point.capture_method_pattern.trim(),
            ));
        }
    }

    /// 有効なブレークポイントの数
    pub fn len(&self) -> usize {
        self.breakpoints().len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.breakpoints().is_empty()
    }
}

/// 有効なキャプチャポイントをすべて登録する
///
/// 現在の登録をすべて外してから、有効な設定を登録し直します。
/// 何度呼んでも重複した登録は残りません。マネージャコンテキストで呼ぶこと。
pub fn install_all(session: &Arc<Session>, points: &[CapturePointConfig]) -> Result<usize> {
    let engine = session.engine();
    debug_assert!(engine.is_manager_context());

    let registry = match CaptureRegistry::get(session) {
        Some(registry) => registry,
        None => CaptureRegistry::attach(session, CorrelationConfig::default()),
    };
    uninstall_all(session);

    let mut installed = Vec::new();
    for point in points.iter().filter(|p| p.enabled) {
        let bp = match StackCapturingBreakpoint::new(session, point.clone(), registry.config()) {
            Ok(bp) => bp,
            Err(e) => {
                warn!("invalid capture point {}: {:#}", point, e);
                continue;
            }
        };
        match bp.create_request(engine) {
            Ok(true) => {}
            Ok(false) => registry.report_unresolved(engine, point),
            Err(e) => {
                warn!("failed to install {}: {:#}", bp, e);
                continue;
            }
        }
        debug!("installed {}", bp);
        installed.push(bp);
    }

    let count = installed.len();
    registry.replace(installed);
    Ok(count)
}

/// 登録済みのキャプチャポイントをすべて外す（何度呼んでもよい）
pub fn uninstall_all(session: &Session) {
    let engine = session.engine();
    debug_assert!(engine.is_manager_context());

    if let Some(registry) = CaptureRegistry::get(session) {
        for bp in registry.replace(Vec::new()).iter() {
            bp.delete_request(engine);
        }
    }
}

/// コンパイル済みの評価器をすべて破棄する（コードのリロード後など）
pub fn clear_caches(session: &Session) {
    debug_assert!(session.engine().is_manager_context());

    if let Some(registry) = CaptureRegistry::get(session) {
        for bp in registry.breakpoints().iter() {
            bp.clear_caches();
        }
    }
}

/// セッションから登録簿とストアを取り外す
pub fn detach(session: &Session) {
    uninstall_all(session);
    session.data().remove::<CaptureRegistry>();
    session.data().remove::<CorrelationStore>();
}

/// 停止中フレームの論理的な前段（記録済みスタック）を探す
///
/// インサートパターンがマッチするキャプチャポイントを登録順に試し、
/// 記録済みスタックが見つかった最初のものを返します。
pub fn lookup_logical_predecessor(session: &Session, frame: &StackFrame) -> Option<CapturedStack> {
    let registry = CaptureRegistry::get(session)?;
    if !registry.config().async_stacks_enabled {
        return None;
    }
    let store = session.data().get::<CorrelationStore>()?;
    if store.is_empty() {
        return None;
    }

    registry
        .breakpoints()
        .iter()
        .filter(|bp| bp.matches_insert(&frame.location))
        .find_map(|bp| bp.related_stack(session, &store, frame))
}

/// キーから記録済みスタックを探す
pub fn lookup_by_key(session: &Session, key: &CorrelationKey) -> Option<CapturedStack> {
    session.data().get::<CorrelationStore>()?.get(key)
}

/// 評価済みの値から記録済みスタックを探す
pub fn lookup_by_value(session: &Session, value: &Value) -> Option<CapturedStack> {
    match CorrelationKey::derive(session.engine(), value) {
        Ok(key) => lookup_by_key(session, &key?),
        Err(e) => {
            debug!("unable to derive key from {}: {:#}", value, e);
            None
        }
    }
}

/// 停止中スレッドの論理トレースを組み立てる
///
/// 内側から順にフレームを調べ、記録済みスタックが見つかったフレームの外側に
/// そのスタックをつなぎます。
pub fn async_stack_trace(session: &Session, thread: ThreadId) -> Result<LogicalTrace> {
    let frames = session.engine().force_frames(thread)?;
    for (i, frame) in frames.iter().enumerate() {
        if let Some(captured) = lookup_logical_predecessor(session, frame) {
            return Ok(LogicalTrace {
                live: frames[..=i].to_vec(),
                captured: Some(captured),
            });
        }
    }
    Ok(LogicalTrace {
        live: frames,
        captured: None,
    })
}
