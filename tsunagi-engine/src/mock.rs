//! メモリ上の模擬デバッギ
//!
//! 実際の仮想マシンの代わりに、スレッド・フレーム・オブジェクト・
//! ブレークポイント要求をメモリ上で再現します。テストとCLIのシミュレータで使います。

use crate::{
    BreakpointHandler, BreakpointRequest, DebugEngine, EngineError, EvaluationContext, Evaluator,
    FrameId, HitDecision, Location, MethodBreakpointSpec, MethodRef, ObjectId, ObjectRef,
    RequestId, Result, StackFrame, ThreadId, Value, Variable,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// 模擬オブジェクト
#[derive(Debug, Clone, Default)]
pub struct MockObject {
    pub runtime_type: String,
    /// 文字列オブジェクトの場合の内容
    pub text: Option<String>,
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
struct MockFrame {
    id: FrameId,
    location: Location,
    arguments: Vec<Value>,
    variables: Vec<Variable>,
}

struct MockRequest {
    spec: MethodBreakpointSpec,
    handler: Arc<dyn BreakpointHandler>,
    resolved: Vec<MethodRef>,
}

struct MockState {
    /// クラス名 -> メソッド一覧（ロード順）
    classes: Vec<(String, Vec<MethodRef>)>,
    /// スレッド -> フレーム（外側から内側の順）
    threads: BTreeMap<ThreadId, Vec<MockFrame>>,
    running: HashSet<ThreadId>,
    objects: HashMap<ObjectId, MockObject>,
    requests: BTreeMap<RequestId, MockRequest>,
    evaluation_errors: HashMap<String, EngineError>,
    console: Vec<String>,
    compiled: Vec<(String, Location)>,
    registrations: usize,
    suspended_hits: usize,
    code_generation: u64,
    force_frames_supported: bool,
    next_object_id: ObjectId,
    next_frame_id: FrameId,
    next_request_id: RequestId,
}

impl MockState {
    fn new() -> Self {
        Self {
            classes: Vec::new(),
            threads: BTreeMap::new(),
            running: HashSet::new(),
            objects: HashMap::new(),
            requests: BTreeMap::new(),
            evaluation_errors: HashMap::new(),
            console: Vec::new(),
            compiled: Vec::new(),
            registrations: 0,
            suspended_hits: 0,
            code_generation: 0,
            force_frames_supported: true,
            next_object_id: 1,
            next_frame_id: 1,
            next_request_id: 1,
        }
    }

    fn find_frame(&self, id: FrameId) -> Option<&MockFrame> {
        self.threads
            .values()
            .flat_map(|frames| frames.iter())
            .find(|f| f.id == id)
    }

    fn check_suspended(&self, thread: ThreadId) -> Result<()> {
        if self.running.contains(&thread) {
            return Err(EngineError::IncompatibleThreadState(thread).into());
        }
        Ok(())
    }

    fn resolve(&self, spec: &MethodBreakpointSpec) -> Vec<MethodRef> {
        self.classes
            .iter()
            .filter(|(name, _)| spec.class_pattern.matches(name))
            .filter_map(|(_, methods)| spec.select(methods).cloned())
            .collect()
    }
}

/// メモリ上の模擬デバッグエンジン
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    /// 空の模擬デバッギを作成する
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// クラスをロードする
    ///
    /// パターンがマッチする既存の要求は、このクラスのメソッドでも解決されます。
    pub fn load_class(&self, name: &str, methods: &[(&str, &str)]) {
        let methods: Vec<MethodRef> = methods
            .iter()
            .map(|(m, sig)| MethodRef::new(name, *m, *sig))
            .collect();

        let mut state = self.state();
        state.classes.retain(|(n, _)| n != name);
        for request in state.requests.values_mut() {
            if request.spec.class_pattern.matches(name) {
                if let Some(m) = request.spec.select(&methods) {
                    request.resolved.push(m.clone());
                }
            }
        }
        state.classes.push((name.to_string(), methods));
    }

    /// 通常のオブジェクトを作成する
    pub fn new_object(&self, runtime_type: &str) -> ObjectRef {
        let mut state = self.state();
        let id = state.next_object_id;
        state.next_object_id += 1;
        state.objects.insert(
            id,
            MockObject {
                runtime_type: runtime_type.to_string(),
                ..MockObject::default()
            },
        );
        ObjectRef::new(id, runtime_type)
    }

    /// 文字列オブジェクトを作成する（呼ぶたびに別インスタンス）
    pub fn new_string(&self, text: &str) -> ObjectRef {
        let obj = self.new_object("java.lang.String");
        if let Some(o) = self.state().objects.get_mut(&obj.id) {
            o.text = Some(text.to_string());
        }
        obj
    }

    /// オブジェクトのフィールドを設定する
    pub fn set_field(&self, object: &ObjectRef, name: &str, value: Value) {
        if let Some(o) = self.state().objects.get_mut(&object.id) {
            o.fields.insert(name.to_string(), value);
        }
    }

    /// オブジェクトを取得する
    pub fn object(&self, id: ObjectId) -> Option<MockObject> {
        self.state().objects.get(&id).cloned()
    }

    /// スレッドにフレームを積む（ヒット処理は行わない）
    pub fn push_frame(&self, thread: ThreadId, location: Location, arguments: Vec<Value>) -> FrameId {
        let mut state = self.state();
        let id = state.next_frame_id;
        state.next_frame_id += 1;
        state.threads.entry(thread).or_default().push(MockFrame {
            id,
            location,
            arguments,
            variables: Vec::new(),
        });
        id
    }

    /// メソッドに入る
    ///
    /// フレームを積んだあと、このメソッドに解決された要求のハンドラを呼び出します。
    /// ハンドラの判断を登録順に返します。
    pub fn enter_method(
        &self,
        thread: ThreadId,
        location: Location,
        arguments: Vec<Value>,
    ) -> Vec<HitDecision> {
        let declaring_type = location.declaring_type.clone();
        let method = location.method.clone();
        self.push_frame(thread, location, arguments);

        // ハンドラはエンジンを呼び返すため、ロックを解放してから呼び出す
        let handlers: Vec<Arc<dyn BreakpointHandler>> = self
            .state()
            .requests
            .values()
            .filter(|r| {
                r.resolved
                    .iter()
                    .any(|m| m.declaring_type == declaring_type && m.name == method)
            })
            .map(|r| Arc::clone(&r.handler))
            .collect();

        let decisions: Vec<HitDecision> = handlers.iter().map(|h| h.on_hit(thread)).collect();
        let suspended = decisions.iter().filter(|d| **d == HitDecision::Suspend).count();
        if suspended > 0 {
            self.state().suspended_hits += suspended;
        }
        trace!("thread {} entered {}.{}: {:?}", thread, declaring_type, method, decisions);
        decisions
    }

    /// スレッドの最も内側のフレームを取り除く
    pub fn pop_frame(&self, thread: ThreadId) -> Option<Location> {
        let mut state = self.state();
        let frames = state.threads.get_mut(&thread)?;
        frames.pop().map(|f| f.location)
    }

    /// 最も内側のフレームに変数を設定する
    pub fn set_variable(&self, thread: ThreadId, name: &str, value: Value) -> Result<()> {
        let mut state = self.state();
        let frame = state
            .threads
            .get_mut(&thread)
            .and_then(|frames| frames.last_mut())
            .ok_or(EngineError::IncompatibleThreadState(thread))?;
        frame.variables.retain(|v| v.name != name);
        frame.variables.push(Variable {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    /// スレッドの実行状態を設定する（実行中のスレッドは調べられない）
    pub fn set_running(&self, thread: ThreadId, running: bool) {
        let mut state = self.state();
        if running {
            state.running.insert(thread);
        } else {
            state.running.remove(&thread);
        }
    }

    /// 式の評価を常に失敗させる
    pub fn fail_evaluation(&self, expression: &str, error: EngineError) {
        self.state()
            .evaluation_errors
            .insert(expression.to_string(), error);
    }

    /// スタックの強制取得のサポート有無を設定する
    pub fn set_force_frames_supported(&self, supported: bool) {
        self.state().force_frames_supported = supported;
    }

    /// コードのリロードを再現する
    pub fn reload_code(&self) -> u64 {
        let mut state = self.state();
        state.code_generation += 1;
        state.code_generation
    }

    /// コンソール出力を取得する
    pub fn console(&self) -> Vec<String> {
        self.state().console.clone()
    }

    /// 式がコンパイルされた回数
    pub fn compile_count(&self) -> usize {
        self.state().compiled.len()
    }

    /// 有効なブレークポイント要求のID
    pub fn active_requests(&self) -> Vec<RequestId> {
        self.state().requests.keys().copied().collect()
    }

    /// 要求が解決したメソッド
    pub fn resolved_methods(&self, id: RequestId) -> Vec<MethodRef> {
        self.state()
            .requests
            .get(&id)
            .map(|r| r.resolved.clone())
            .unwrap_or_default()
    }

    /// これまでに登録された要求の総数
    pub fn registration_count(&self) -> usize {
        self.state().registrations
    }

    /// ハンドラがスレッドを停止させた回数
    pub fn suspended_hits(&self) -> usize {
        self.state().suspended_hits
    }

    /// フレームの有無を問わずスレッドの一覧を取得する
    pub fn threads(&self) -> Vec<ThreadId> {
        self.state().threads.keys().copied().collect()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugEngine for MockEngine {
    fn register_method_breakpoint(
        &self,
        spec: MethodBreakpointSpec,
        handler: Arc<dyn BreakpointHandler>,
    ) -> Result<BreakpointRequest> {
        let mut state = self.state();
        let id = state.next_request_id;
        state.next_request_id += 1;
        state.registrations += 1;

        let resolved = state.resolve(&spec);
        debug!(
            "request {} registered for {}.{} ({} methods)",
            id,
            spec.class_pattern,
            spec.method_name,
            resolved.len()
        );
        state.requests.insert(
            id,
            MockRequest {
                spec,
                handler,
                resolved: resolved.clone(),
            },
        );
        Ok(BreakpointRequest { id, resolved })
    }

    fn delete_request(&self, id: RequestId) -> Result<()> {
        self.state()
            .requests
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::RequestNotFound(id).into())
    }

    fn supports_force_frames(&self) -> bool {
        self.state().force_frames_supported
    }

    fn force_frames(&self, thread: ThreadId) -> Result<Vec<StackFrame>> {
        let state = self.state();
        if !state.force_frames_supported {
            return Err(EngineError::Unsupported("force frames").into());
        }
        state.check_suspended(thread)?;
        let frames = state.threads.get(&thread).map(Vec::as_slice).unwrap_or(&[]);
        Ok(frames
            .iter()
            .rev()
            .map(|f| StackFrame {
                id: f.id,
                thread,
                location: f.location.clone(),
            })
            .collect())
    }

    fn argument_values(&self, frame: &StackFrame) -> Result<Vec<Value>> {
        let state = self.state();
        state.check_suspended(frame.thread)?;
        state
            .find_frame(frame.id)
            .map(|f| f.arguments.clone())
            .ok_or_else(|| EngineError::InvalidFrame.into())
    }

    fn visible_variables(&self, frame: &StackFrame) -> Result<Vec<Variable>> {
        let state = self.state();
        state.check_suspended(frame.thread)?;
        state
            .find_frame(frame.id)
            .map(|f| f.variables.clone())
            .ok_or_else(|| EngineError::InvalidFrame.into())
    }

    fn compile_expression(
        &self,
        expression: &str,
        location: &Location,
    ) -> Result<Arc<dyn Evaluator>> {
        let path: Vec<String> = expression.trim().split('.').map(str::to_string).collect();
        let valid = path.iter().all(|seg| {
            !seg.is_empty()
                && seg.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });
        if !valid {
            return Err(EngineError::Evaluation(format!("Invalid expression: {}", expression)).into());
        }

        self.state()
            .compiled
            .push((expression.to_string(), location.clone()));
        Ok(Arc::new(MockEvaluator {
            expression: expression.to_string(),
            path,
            state: Arc::clone(&self.state),
        }))
    }

    fn string_value(&self, object: &ObjectRef) -> Result<Option<String>> {
        self.state()
            .objects
            .get(&object.id)
            .map(|o| o.text.clone())
            .ok_or_else(|| EngineError::InvalidObject(object.id).into())
    }

    fn code_generation(&self) -> u64 {
        self.state().code_generation
    }

    fn print_to_console(&self, message: &str) {
        self.state().console.push(message.to_string());
    }
}

/// 変数とフィールドの経路だけを辿る評価器
struct MockEvaluator {
    expression: String,
    path: Vec<String>,
    state: Arc<Mutex<MockState>>,
}

impl Evaluator for MockEvaluator {
    fn evaluate(&self, _engine: &dyn DebugEngine, context: &EvaluationContext) -> Result<Value> {
        let state = lock(&self.state);
        state.check_suspended(context.thread)?;
        if let Some(err) = state.evaluation_errors.get(&self.expression) {
            return Err(err.clone().into());
        }

        let frame = state
            .find_frame(context.frame.id)
            .ok_or(EngineError::InvalidFrame)?;
        let (head, rest) = self
            .path
            .split_first()
            .ok_or_else(|| EngineError::Evaluation("Empty expression".into()))?;
        let mut value = frame
            .variables
            .iter()
            .find(|v| v.name == *head)
            .map(|v| v.value.clone())
            .ok_or_else(|| EngineError::Evaluation(format!("Cannot find local variable '{}'", head)))?;

        for field in rest {
            let obj = match &value {
                Value::Object(obj) => obj.clone(),
                Value::Null => {
                    return Err(EngineError::Evaluation("java.lang.NullPointerException".into()).into())
                }
                _ => {
                    return Err(EngineError::Evaluation(format!(
                        "Cannot access field '{}' of a primitive value",
                        field
                    ))
                    .into())
                }
            };
            value = state
                .objects
                .get(&obj.id)
                .ok_or(EngineError::InvalidObject(obj.id))?
                .fields
                .get(field)
                .cloned()
                .ok_or_else(|| {
                    EngineError::Evaluation(format!("No such field '{}' in {}", field, obj.runtime_type))
                })?;
        }
        Ok(value)
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassPattern;

    struct Recorder(Mutex<Vec<ThreadId>>);

    impl BreakpointHandler for Recorder {
        fn on_hit(&self, thread: ThreadId) -> HitDecision {
            lock_vec(&self.0).push(thread);
            HitDecision::Resume
        }
    }

    /// 特定のスレッドだけ停止させるハンドラ
    struct StopOn(ThreadId);

    impl BreakpointHandler for StopOn {
        fn on_hit(&self, thread: ThreadId) -> HitDecision {
            if thread == self.0 {
                HitDecision::Suspend
            } else {
                HitDecision::Resume
            }
        }
    }

    fn lock_vec<T>(m: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
        m.lock().unwrap()
    }

    #[test]
    fn test_register_and_hit() {
        let engine = MockEngine::new();
        engine.load_class("app.Producer", &[("submit", "(Ljava/lang/Object;)V")]);

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let spec = MethodBreakpointSpec::non_suspending(
            ClassPattern::new("app.Producer").unwrap(),
            "submit",
        );
        let request = engine.register_method_breakpoint(spec, recorder.clone()).unwrap();
        assert_eq!(request.resolved.len(), 1);

        let decisions = engine.enter_method(
            ThreadId(1),
            Location::new("app.Producer", "submit", 10),
            vec![Value::Null],
        );
        assert_eq!(decisions, vec![HitDecision::Resume]);
        assert_eq!(*recorder.0.lock().unwrap(), vec![ThreadId(1)]);

        engine.delete_request(request.id).unwrap();
        assert!(engine.delete_request(request.id).is_err());
        engine.enter_method(ThreadId(1), Location::new("app.Producer", "submit", 10), vec![]);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_suspending_hits_are_counted() {
        let engine = MockEngine::new();
        engine.load_class("app.Worker", &[("run", "()V")]);
        let spec = MethodBreakpointSpec::non_suspending(ClassPattern::new("app.Worker").unwrap(), "run");
        engine
            .register_method_breakpoint(spec, Arc::new(StopOn(ThreadId(2))))
            .unwrap();

        let run = Location::new("app.Worker", "run", 1);
        assert_eq!(engine.enter_method(ThreadId(1), run.clone(), vec![]), vec![HitDecision::Resume]);
        assert_eq!(engine.suspended_hits(), 0);
        assert_eq!(engine.enter_method(ThreadId(2), run, vec![]), vec![HitDecision::Suspend]);
        assert_eq!(engine.suspended_hits(), 1);
    }

    #[test]
    fn test_late_class_load_resolves_request() {
        let engine = MockEngine::new();
        let spec = MethodBreakpointSpec::non_suspending(ClassPattern::new("app.*").unwrap(), "run");
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let request = engine.register_method_breakpoint(spec, recorder).unwrap();
        assert!(request.resolved.is_empty());

        engine.load_class("app.Worker", &[("run", "()V")]);
        assert_eq!(engine.resolved_methods(request.id).len(), 1);
    }

    #[test]
    fn test_evaluate_field_path() {
        let engine = MockEngine::new();
        let job = engine.new_object("app.Job");
        let consumer = engine.new_object("app.Consumer");
        engine.set_field(&consumer, "key", Value::Object(job.clone()));

        let tid = ThreadId(2);
        engine.push_frame(tid, Location::new("app.Consumer", "run", 5), vec![]);
        engine.set_variable(tid, "this", Value::Object(consumer)).unwrap();

        let frame = engine.force_frames(tid).unwrap().remove(0);
        let evaluator = engine.compile_expression("this.key", &frame.location).unwrap();
        let ctx = EvaluationContext::new(tid, frame);
        assert_eq!(evaluator.evaluate(&engine, &ctx).unwrap(), Value::Object(job));

        let missing = engine.compile_expression("that", ctx.location()).unwrap();
        assert!(missing.evaluate(&engine, &ctx).is_err());
        assert!(engine.compile_expression("a + b", ctx.location()).is_err());
        assert_eq!(engine.compile_count(), 2);
    }

    #[test]
    fn test_running_thread_is_incompatible() {
        let engine = MockEngine::new();
        let tid = ThreadId(4);
        engine.push_frame(tid, Location::new("app.Main", "main", 1), vec![]);
        engine.set_running(tid, true);

        let err = engine.force_frames(tid).unwrap_err();
        assert!(EngineError::is_thread_state_race(&err));

        engine.set_force_frames_supported(false);
        let err = engine.force_frames(tid).unwrap_err();
        assert!(EngineError::is_unsupported(&err));
    }

    #[test]
    fn test_strings_are_distinct_instances() {
        let engine = MockEngine::new();
        let a = engine.new_string("job-1");
        let b = engine.new_string("job-1");
        assert_ne!(a.id, b.id);
        assert_eq!(engine.string_value(&a).unwrap().as_deref(), Some("job-1"));
        assert_eq!(engine.string_value(&engine.new_object("X")).unwrap(), None);
    }
}
