//! デバッグセッション

use crate::DebugEngine;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// セッションID
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// セッションに紐づく型付き拡張データ
///
/// 型そのものをキーとして、セッションの寿命に合わせたデータを保持します。
/// セッション終了時に `clear` されます。
#[derive(Default)]
pub struct SessionData {
    entries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl SessionData {
    /// 空の拡張データを作成する
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<TypeId, Arc<dyn Any + Send + Sync>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// データを取得する
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entry = self.entries().get(&TypeId::of::<T>()).cloned()?;
        entry.downcast::<T>().ok()
    }

    /// データを取得する（なければ作成）
    pub fn get_or_insert_with<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut entries = self.entries();
        let entry = entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(init()) as Arc<dyn Any + Send + Sync>)
            .clone();
        drop(entries);

        match entry.downcast::<T>() {
            Ok(value) => value,
            // TypeId でキー付けしているため型は必ず一致する
            Err(_) => unreachable!("session data keyed by TypeId has mismatched type"),
        }
    }

    /// データを設定する（既存の値を返す）
    pub fn insert<T: Any + Send + Sync>(&self, value: Arc<T>) -> Option<Arc<T>> {
        let previous = self.entries().insert(TypeId::of::<T>(), value)?;
        previous.downcast::<T>().ok()
    }

    /// データを削除する
    pub fn remove<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let previous = self.entries().remove(&TypeId::of::<T>())?;
        previous.downcast::<T>().ok()
    }

    /// すべてのデータを破棄する
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// 登録されているデータの数
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// 1つのデバッギに対するデバッグセッション
pub struct Session {
    id: SessionId,
    engine: Arc<dyn DebugEngine>,
    data: SessionData,
    closed: AtomicBool,
}

impl Session {
    /// セッションを開始する
    pub fn start(engine: Arc<dyn DebugEngine>) -> Arc<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("session {} started", id);
        Arc::new(Self {
            id,
            engine,
            data: SessionData::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// セッションIDを取得する
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// エンジンを取得する
    pub fn engine(&self) -> &dyn DebugEngine {
        self.engine.as_ref()
    }

    /// セッションスコープのデータを取得する
    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// セッションが終了済みかどうか
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// セッションを終了し、紐づくデータをすべて破棄する
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("session {} closed", self.id);
        }
        self.data.clear();
    }
}
