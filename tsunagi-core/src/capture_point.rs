//! キャプチャポイントの定義

use crate::Result;
use std::fmt;
use std::sync::{Arc, RwLock};

/// キャプチャポイントとインサートポイントの組
///
/// 変更するときは値ごと差し替えます（部分的に書き換えない）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePointConfig {
    pub capture_class_pattern: String,
    pub capture_method_pattern: String,
    pub capture_key_expr: String,
    /// 空の場合はすべての型にマッチする
    pub insert_class_pattern: String,
    pub insert_method_pattern: String,
    pub insert_key_expr: String,
    pub enabled: bool,
}

impl CapturePointConfig {
    /// 有効なキャプチャポイントを作成する
    pub fn new(
        capture: (&str, &str, &str),
        insert: (&str, &str, &str),
    ) -> Self {
        Self {
            capture_class_pattern: capture.0.to_string(),
            capture_method_pattern: capture.1.to_string(),
            capture_key_expr: capture.2.to_string(),
            insert_class_pattern: insert.0.to_string(),
            insert_method_pattern: insert.1.to_string(),
            insert_key_expr: insert.2.to_string(),
            enabled: true,
        }
    }

    /// 有効・無効を変えた値を作る
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }
}

impl fmt::Display for CapturePointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}:{} => {}.{}:{}",
            self.capture_class_pattern,
            self.capture_method_pattern,
            self.capture_key_expr,
            self.insert_class_pattern,
            self.insert_method_pattern,
            self.insert_key_expr
        )
    }
}

/// オペレータが構成したキャプチャポイントの集合
///
/// 読み手は常に一貫したスナップショットを受け取ります。
#[derive(Default)]
pub struct CapturePointSettings {
    points: RwLock<Arc<Vec<CapturePointConfig>>>,
}

impl CapturePointSettings {
    /// 空の設定を作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の設定のスナップショット
    pub fn snapshot(&self) -> Arc<Vec<CapturePointConfig>> {
        Arc::clone(&self.points.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<CapturePointConfig>) -> Result<()>,
    {
        let mut guard = self.points.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.as_ref().clone();
        f(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// 設定全体を置き換える
    pub fn set_all(&self, points: Vec<CapturePointConfig>) {
        *self.points.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(points);
    }

    /// キャプチャポイントを追加し、そのインデックスを返す
    pub fn add(&self, point: CapturePointConfig) -> usize {
        let mut guard = self.points.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.as_ref().clone();
        next.push(point);
        let index = next.len() - 1;
        *guard = Arc::new(next);
        index
    }

    /// キャプチャポイントを削除する
    pub fn remove(&self, index: usize) -> Result<CapturePointConfig> {
        let mut removed = None;
        self.update(|points| {
            if index >= points.len() {
                anyhow::bail!("No capture point #{}", index);
            }
            removed = Some(points.remove(index));
            Ok(())
        })?;
        removed.ok_or_else(|| anyhow::anyhow!("No capture point #{}", index))
    }

    /// 有効・無効を切り替える
    ///
    /// 値が変わった場合は `true` を返します。
    pub fn set_enabled(&self, index: usize, enabled: bool) -> Result<bool> {
        let mut changed = false;
        self.update(|points| {
            let point = points
                .get_mut(index)
                .ok_or_else(|| anyhow::anyhow!("No capture point #{}", index))?;
            if point.enabled != enabled {
                *point = point.with_enabled(enabled);
                changed = true;
            }
            Ok(())
        })?;
        Ok(changed)
    }

    /// キャプチャポイントの数
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
