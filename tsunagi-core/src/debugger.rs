//! デバッガのメインロジック

use crate::registry::{self, CaptureRegistry};
use crate::{
    CapturePointConfig, CapturePointSettings, CapturedStack, CorrelationConfig, CorrelationKey,
    CorrelationStore, LogicalTrace, Result,
};
use std::sync::Arc;
use tracing::info;
use tsunagi_engine::{DebugEngine, Session, ThreadId};

/// デバッガ
///
/// キャプチャポイントの設定を保持し、変更のたびにセッションへの登録を同期します。
pub struct Debugger {
    /// デバッグセッション
    session: Arc<Session>,
    /// オペレータが構成したキャプチャポイント
    settings: CapturePointSettings,
    /// 相関機能の設定
    config: CorrelationConfig,
}

impl Debugger {
    /// 新しいデバッガを作成し、キャプチャポイントを登録する
    pub fn start(
        engine: Arc<dyn DebugEngine>,
        config: CorrelationConfig,
        points: Vec<CapturePointConfig>,
    ) -> Result<Self> {
        let session = Session::start(engine);
        CaptureRegistry::attach(&session, config.clone());

        let debugger = Self {
            session,
            settings: CapturePointSettings::new(),
            config,
        };
        debugger.settings.set_all(points);
        debugger.sync()?;
        Ok(debugger)
    }

    /// 設定とセッションの登録を同期する
    pub fn sync(&self) -> Result<usize> {
        let installed = registry::install_all(&self.session, &self.settings.snapshot())?;
        info!("{} capture point(s) installed", installed);
        Ok(installed)
    }

    /// セッションを取得する
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// 相関機能の設定を取得する
    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// キャプチャポイントの一覧
    pub fn capture_points(&self) -> Arc<Vec<CapturePointConfig>> {
        self.settings.snapshot()
    }

    /// キャプチャポイントを追加する
    pub fn add_capture_point(&self, point: CapturePointConfig) -> Result<usize> {
        let index = self.settings.add(point);
        self.sync()?;
        Ok(index)
    }

    /// キャプチャポイントを削除する
    pub fn remove_capture_point(&self, index: usize) -> Result<CapturePointConfig> {
        let removed = self.settings.remove(index)?;
        self.sync()?;
        Ok(removed)
    }

    /// キャプチャポイントの有効・無効を切り替える
    pub fn set_enabled(&self, index: usize, enabled: bool) -> Result<()> {
        if self.settings.set_enabled(index, enabled)? {
            self.sync()?;
        }
        Ok(())
    }

    /// コードのリロード後に呼ぶ
    pub fn on_code_reload(&self) {
        registry::clear_caches(&self.session);
    }

    /// 有効なブレークポイントの数
    pub fn installed_count(&self) -> usize {
        CaptureRegistry::get(&self.session).map_or(0, |r| r.len())
    }

    /// 記録済みスタックの数
    pub fn stored_count(&self) -> usize {
        self.session
            .data()
            .get::<CorrelationStore>()
            .map_or(0, |s| s.len())
    }

    /// キーから記録済みスタックを探す
    pub fn lookup(&self, key: &CorrelationKey) -> Option<CapturedStack> {
        registry::lookup_by_key(&self.session, key)
    }

    /// スレッドの論理トレースを取得する
    pub fn async_stack_trace(&self, thread: ThreadId) -> Result<LogicalTrace> {
        registry::async_stack_trace(&self.session, thread)
    }

    /// セッションを終了する
    pub fn shutdown(&self) {
        registry::detach(&self.session);
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsunagi_engine::{Location, MockEngine, Value};

    fn point() -> CapturePointConfig {
        CapturePointConfig::new(("app.Producer", "submit", "param_0"), ("app.Consumer", "run", "this.key"))
    }

    fn debugger(points: Vec<CapturePointConfig>) -> (Arc<MockEngine>, Debugger) {
        let engine = Arc::new(MockEngine::new());
        engine.load_class("app.Producer", &[("submit", "(Ljava/lang/Object;)V")]);
        let debugger = Debugger::start(engine.clone(), CorrelationConfig::default(), points).unwrap();
        (engine, debugger)
    }

    #[test]
    fn test_disable_and_enable_does_not_duplicate() {
        let (engine, debugger) = debugger(vec![point()]);
        assert_eq!(debugger.installed_count(), 1);

        debugger.set_enabled(0, false).unwrap();
        assert!(engine.active_requests().is_empty());
        debugger.set_enabled(0, true).unwrap();
        debugger.set_enabled(0, true).unwrap();
        assert_eq!(engine.active_requests().len(), 1);
        assert_eq!(debugger.installed_count(), 1);
    }

    #[test]
    fn test_resync_does_not_repeat_mismatch() {
        let publish = CapturePointConfig::new(("app.Producer", "publish", "param_0"), ("", "run", ""));
        let (engine, debugger) = debugger(vec![publish]);
        debugger.add_capture_point(point()).unwrap();
        debugger.set_enabled(1, false).unwrap();
        debugger.set_enabled(1, true).unwrap();

        assert_eq!(engine.console(), vec!["Capture point app.Producer.publish matches no method"]);
        assert_eq!(debugger.installed_count(), 2);
    }

    #[test]
    fn test_add_and_remove() {
        let (engine, debugger) = debugger(Vec::new());
        assert_eq!(debugger.add_capture_point(point()).unwrap(), 0);
        assert_eq!(engine.active_requests().len(), 1);

        let removed = debugger.remove_capture_point(0).unwrap();
        assert_eq!(removed, point());
        assert!(engine.active_requests().is_empty());
        assert!(debugger.remove_capture_point(0).is_err());
        assert!(debugger.set_enabled(4, false).is_err());
    }

    #[test]
    fn test_code_reload_recompiles() {
        let (engine, debugger) = debugger(vec![CapturePointConfig::new(
            ("app.Producer", "submit", "job"),
            ("app.Consumer", "run", "this.key"),
        )]);

        let hit = |line| {
            engine.enter_method(ThreadId(1), Location::new("app.Producer", "submit", line), vec![]);
            engine.pop_frame(ThreadId(1));
        };
        hit(3);
        hit(3);
        assert_eq!(engine.compile_count(), 1);

        debugger.on_code_reload();
        hit(3);
        assert_eq!(engine.compile_count(), 2);

        // 世代が変わったエントリも再利用しない
        engine.reload_code();
        hit(3);
        assert_eq!(engine.compile_count(), 3);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let (engine, debugger) = debugger(vec![point()]);
        let job = engine.new_object("app.Job");
        engine.enter_method(
            ThreadId(1),
            Location::new("app.Producer", "submit", 3),
            vec![Value::Object(job.clone())],
        );
        assert_eq!(debugger.stored_count(), 1);

        debugger.shutdown();
        assert!(engine.active_requests().is_empty());
        assert_eq!(debugger.stored_count(), 0);
        assert!(debugger.lookup(&CorrelationKey::Object(job.id)).is_none());
        assert!(debugger.session().is_closed());
    }
}
