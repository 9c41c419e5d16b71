//! キー式の評価と評価器キャッシュ

use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, trace};
use tsunagi_engine::{DebugEngine, EngineError, EvaluationContext, Evaluator, Location, Value};

/// 引数を直接読む省略記法（`param_0`, `param_1`, ...）
fn param_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^param_(\d+)$").expect("valid parameter pattern"))
}

/// 式が引数の省略記法であれば引数のインデックスを返す
pub fn parse_param_id(expression: &str) -> Option<usize> {
    param_pattern()
        .captures(expression.trim())
        .and_then(|caps| caps[1].parse().ok())
}

struct CachedEvaluator {
    /// コンパイル時のコード世代
    generation: u64,
    evaluator: Arc<dyn Evaluator>,
}

/// コード位置ごとのコンパイル済み評価器キャッシュ
///
/// エントリはコンパイルした時点のコード世代を持ち、世代が変わったエントリは
/// 再利用されません。`clear` でまとめて破棄します。
#[derive(Default)]
pub struct EvaluatorCache {
    entries: Mutex<HashMap<Location, CachedEvaluator>>,
}

impl EvaluatorCache {
    /// 空のキャッシュを作成する
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Location, CachedEvaluator>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// キャッシュ済みの評価器を取得する（なければコンパイル）
    pub fn get_or_compile(
        &self,
        engine: &dyn DebugEngine,
        location: &Location,
        expression: &str,
    ) -> Result<Arc<dyn Evaluator>> {
        let generation = engine.code_generation();
        if let Some(cached) = self.entries().get(location) {
            if cached.generation == generation {
                return Ok(Arc::clone(&cached.evaluator));
            }
        }

        // コンパイル中はロックを保持しない。同時に同じ位置をコンパイルした場合は後勝ち
        trace!("compiling '{}' at {}", expression, location);
        let evaluator = engine.compile_expression(expression, location)?;
        self.entries().insert(
            location.clone(),
            CachedEvaluator {
                generation,
                evaluator: Arc::clone(&evaluator),
            },
        );
        Ok(evaluator)
    }

    /// すべての評価器を破棄する
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// キャッシュされている評価器の数
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// キャプチャ式またはインサート式の評価器
pub struct KeyEvaluator {
    expression: String,
    param_id: Option<usize>,
    cache: EvaluatorCache,
}

impl KeyEvaluator {
    /// 評価器を作成する
    pub fn new(expression: &str) -> Self {
        let expression = expression.trim().to_string();
        let param_id = parse_param_id(&expression);
        Self {
            expression,
            param_id,
            cache: EvaluatorCache::new(),
        }
    }

    /// 式の文字列を取得する
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 引数の省略記法かどうか
    pub fn is_param(&self) -> bool {
        self.param_id.is_some()
    }

    /// 式を評価する
    ///
    /// 式が空の場合は `Ok(None)` を返します。
    pub fn evaluate(
        &self,
        engine: &dyn DebugEngine,
        context: &EvaluationContext,
    ) -> Result<Option<Value>> {
        if let Some(index) = self.param_id {
            let arguments = engine.argument_values(&context.frame)?;
            return match arguments.get(index) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(EngineError::Evaluation(format!(
                    "Param index {} requested, but only {} available",
                    index,
                    arguments.len()
                ))
                .into()),
            };
        }

        if self.expression.is_empty() {
            return Ok(None);
        }

        let evaluator = self
            .cache
            .get_or_compile(engine, context.location(), &self.expression)?;
        evaluator.evaluate(engine, context).map(Some)
    }

    /// キャッシュ済みの評価器を破棄する
    pub fn clear_cache(&self) {
        debug!("clearing {} cached evaluators for '{}'", self.cache.len(), self.expression);
        self.cache.clear();
    }

    /// キャッシュへの参照を取得する
    pub fn cache(&self) -> &EvaluatorCache {
        &self.cache
    }
}
