//! キャプチャからインサートまでの統合テスト

use std::sync::Arc;
use tsunagi_core::registry;
use tsunagi_core::{CapturePointConfig, CorrelationConfig, CorrelationKey, Debugger};
use tsunagi_engine::{DebugEngine, EngineError, HitDecision, Location, MockEngine, ThreadId, Value};

const PRODUCER_CONSUMER: &str = "app.Producer.submit:param_0 => app.Consumer.run:this.key";

fn start(config: CorrelationConfig, definitions: &[&str]) -> (Arc<MockEngine>, Debugger) {
    let engine = Arc::new(MockEngine::new());
    engine.load_class("app.Producer", &[("submit", "(Ljava/lang/Object;)V")]);
    let points: Vec<CapturePointConfig> = definitions
        .iter()
        .map(|d| d.parse().expect("valid definition"))
        .collect();
    let debugger = Debugger::start(engine.clone(), config, points).expect("Failed to start debugger");
    (engine, debugger)
}

/// 生産者スレッドで submit を呼ぶ
fn submit(engine: &MockEngine, thread: ThreadId, key: Value) -> Vec<HitDecision> {
    engine.push_frame(thread, Location::new("app.Main", "main", 5), vec![]);
    engine.enter_method(thread, Location::new("app.Producer", "submit", 10), vec![key])
}

/// 消費者スレッドで run に入り、this.key を設定する
fn consume(engine: &MockEngine, thread: ThreadId, key: Value) {
    let consumer = engine.new_object("app.Consumer");
    engine.set_field(&consumer, "key", key);
    engine.push_frame(thread, Location::new("app.Worker", "loop", 30), vec![]);
    engine.enter_method(thread, Location::new("app.Consumer", "run", 40), vec![]);
    engine.set_variable(thread, "this", Value::Object(consumer)).unwrap();
}

fn methods(trace: &tsunagi_core::LogicalTrace) -> (Vec<String>, Vec<String>) {
    let live = trace.live.iter().map(|f| f.location.method.clone()).collect();
    let captured = trace
        .captured
        .as_ref()
        .map(|c| c.frames().iter().map(|f| f.location.method.clone()).collect())
        .unwrap_or_default();
    (live, captured)
}

#[test]
fn test_producer_consumer_trace() {
    let (engine, debugger) = start(CorrelationConfig::default(), &[PRODUCER_CONSUMER]);
    let job = Value::Object(engine.new_object("app.Job"));

    let decisions = submit(&engine, ThreadId(1), job.clone());
    assert_eq!(decisions, vec![HitDecision::Resume]);
    assert_eq!(engine.suspended_hits(), 0);
    assert_eq!(debugger.stored_count(), 1);

    consume(&engine, ThreadId(2), job);
    let trace = debugger.async_stack_trace(ThreadId(2)).unwrap();
    let (live, captured) = methods(&trace);
    assert_eq!(live, vec!["run"]);
    assert_eq!(captured, vec!["submit", "main"]);
    assert!(engine.console().is_empty());
}

#[test]
fn test_failing_capture_expression() {
    let (engine, debugger) = start(
        CorrelationConfig::default(),
        &["app.Producer.submit:job.id => app.Consumer.run:this.key"],
    );
    engine.fail_evaluation("job.id", EngineError::Evaluation("boom".to_string()));

    let decisions = submit(&engine, ThreadId(1), Value::Null);
    assert_eq!(decisions, vec![HitDecision::Resume]);
    assert_eq!(engine.suspended_hits(), 0);
    assert_eq!(debugger.stored_count(), 0);
    assert_eq!(engine.console(), vec!["Unable to evaluate capture expression: boom"]);
}

#[test]
fn test_text_keys_correlate_by_content() {
    let (engine, debugger) = start(CorrelationConfig::default(), &[PRODUCER_CONSUMER]);

    submit(&engine, ThreadId(1), Value::Object(engine.new_string("order-17")));
    consume(&engine, ThreadId(2), Value::Object(engine.new_string("order-17")));

    let trace = debugger.async_stack_trace(ThreadId(2)).unwrap();
    assert!(trace.captured.is_some());
    assert!(debugger
        .lookup(&CorrelationKey::Text("order-17".to_string()))
        .is_some());
}

#[test]
fn test_primitive_keys_are_ignored() {
    let (engine, debugger) = start(CorrelationConfig::default(), &[PRODUCER_CONSUMER]);

    submit(&engine, ThreadId(1), Value::int(7));
    submit(&engine, ThreadId(1), Value::Null);
    assert_eq!(debugger.stored_count(), 0);
    assert!(engine.console().is_empty());
}

#[test]
fn test_capacity_evicts_oldest() {
    let config = CorrelationConfig {
        store_capacity: 2,
        ..CorrelationConfig::default()
    };
    let (engine, debugger) = start(config, &[PRODUCER_CONSUMER]);

    let jobs: Vec<_> = (0..3).map(|_| engine.new_object("app.Job")).collect();
    for job in &jobs {
        submit(&engine, ThreadId(1), Value::Object(job.clone()));
    }

    assert_eq!(debugger.stored_count(), 2);
    assert!(debugger.lookup(&CorrelationKey::Object(jobs[0].id)).is_none());
    assert!(debugger.lookup(&CorrelationKey::Object(jobs[1].id)).is_some());
    assert!(debugger.lookup(&CorrelationKey::Object(jobs[2].id)).is_some());
}

#[test]
fn test_stack_length_limit() {
    let config = CorrelationConfig {
        max_stack_length: 1,
        ..CorrelationConfig::default()
    };
    let (engine, debugger) = start(config, &[PRODUCER_CONSUMER]);
    let job = engine.new_object("app.Job");
    submit(&engine, ThreadId(1), Value::Object(job.clone()));

    let stack = debugger.lookup(&CorrelationKey::Object(job.id)).unwrap();
    assert_eq!(stack.depth(), 1);
    assert_eq!(stack.frames()[0].location.method, "submit");
}

#[test]
fn test_insert_failure_is_reported() {
    let (engine, debugger) = start(CorrelationConfig::default(), &[PRODUCER_CONSUMER]);
    submit(&engine, ThreadId(1), Value::Object(engine.new_object("app.Job")));

    // this を設定しないまま run に入る
    engine.enter_method(ThreadId(2), Location::new("app.Consumer", "run", 40), vec![]);
    let trace = debugger.async_stack_trace(ThreadId(2)).unwrap();
    assert!(trace.captured.is_none());
    assert_eq!(trace.live.len(), 1);
    assert_eq!(
        engine.console(),
        vec!["Unable to evaluate insert expression: Cannot find local variable 'this'"]
    );
}

#[test]
fn test_thread_state_race_is_silent() {
    let (engine, debugger) = start(CorrelationConfig::default(), &[PRODUCER_CONSUMER]);
    let job = Value::Object(engine.new_object("app.Job"));
    submit(&engine, ThreadId(1), job.clone());
    consume(&engine, ThreadId(2), job);

    let frame = engine.force_frames(ThreadId(2)).unwrap().remove(0);
    engine.set_running(ThreadId(2), true);
    assert!(registry::lookup_logical_predecessor(debugger.session(), &frame).is_none());

    // 生産者側でも同じ
    engine.set_running(ThreadId(1), true);
    submit(&engine, ThreadId(1), Value::Object(engine.new_object("app.Job")));
    assert!(engine.console().is_empty());
    assert_eq!(debugger.stored_count(), 1);
}

#[test]
fn test_first_stored_stack_wins() {
    let (engine, debugger) = start(
        CorrelationConfig::default(),
        &[
            "app.Producer.submit:param_0 => .run:this.missing",
            PRODUCER_CONSUMER,
        ],
    );
    let job = Value::Object(engine.new_object("app.Job"));
    submit(&engine, ThreadId(1), job.clone());
    consume(&engine, ThreadId(2), job);

    // 最初のキャプチャポイントのインサート式は失敗するが、次のポイントでつながる
    let trace = debugger.async_stack_trace(ThreadId(2)).unwrap();
    assert!(trace.captured.is_some());
    assert_eq!(engine.console().len(), 1);
}

#[test]
fn test_unsupported_target_degrades_silently() {
    let (engine, debugger) = start(CorrelationConfig::default(), &[PRODUCER_CONSUMER]);
    engine.set_force_frames_supported(false);

    let decisions = submit(&engine, ThreadId(1), Value::Object(engine.new_object("app.Job")));
    assert_eq!(decisions, vec![HitDecision::Resume]);
    assert_eq!(debugger.stored_count(), 0);
    assert!(engine.console().is_empty());
}
