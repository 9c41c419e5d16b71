//! 相関ストア

use crate::{CapturedStack, CorrelationKey};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// セッションごとのストア容量の既定値
pub const DEFAULT_STORE_CAPACITY: usize = 1000;

#[derive(Default)]
struct StoreInner {
    entries: HashMap<CorrelationKey, CapturedStack>,
    /// 挿入順（古い順）
    order: VecDeque<CorrelationKey>,
}

/// 相関キーから記録済みスタックへの固定容量マップ
///
/// 容量を超えると最も古く挿入されたエントリを追い出します。
/// 読み出しは順序に影響しません。既存のキーへの書き込みは値だけを置き換え、
/// 挿入順の位置は変わりません。
pub struct CorrelationStore {
    capacity: usize,
    inner: Mutex<StoreInner>,
}

impl CorrelationStore {
    /// 指定した容量のストアを作成する（最小1）
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// スタックを格納する
    ///
    /// 追い出されたキーがあれば返します。
    pub fn put(&self, key: CorrelationKey, stack: CapturedStack) -> Option<CorrelationKey> {
        let mut inner = self.inner();
        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = stack;
            return None;
        }

        let evicted = if inner.entries.len() >= self.capacity {
            let oldest = inner.order.pop_front();
            if let Some(oldest) = &oldest {
                inner.entries.remove(oldest);
                trace!("evicted {}", oldest);
            }
            oldest
        } else {
            None
        };

        inner.order.push_back(key.clone());
        inner.entries.insert(key, stack);
        evicted
    }

    /// スタックを取得する
    pub fn get(&self, key: &CorrelationKey) -> Option<CapturedStack> {
        self.inner().entries.get(key).cloned()
    }

    /// キーが格納されているか
    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.inner().entries.contains_key(key)
    }

    /// 格納されているエントリの数
    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.inner().entries.is_empty()
    }

    /// 容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// すべてのエントリを破棄する
    pub fn clear(&self) {
        let mut inner = self.inner();
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CapturedFrame;
    use std::sync::Arc;
    use std::thread;
    use tsunagi_engine::Location;

    fn stack(method: &str) -> CapturedStack {
        CapturedStack::new(vec![CapturedFrame {
            location: Location::new("app.Producer", method, 1),
            variables: Vec::new(),
        }])
    }

    fn key(i: u64) -> CorrelationKey {
        CorrelationKey::Object(i)
    }

    #[test]
    fn test_put_then_get_returns_same_stack() {
        let store = CorrelationStore::new(4);
        let frames = stack("submit");
        store.put(key(1), frames.clone());

        let found = store.get(&key(1)).unwrap();
        assert!(found.ptr_eq(&frames));
        assert!(store.get(&key(2)).is_none());
    }

    #[test]
    fn test_evicts_oldest_inserted() {
        let store = CorrelationStore::new(3);
        for i in 0..3 {
            assert_eq!(store.put(key(i), stack("submit")), None);
        }
        // 読み出しは順序に影響しない
        store.get(&key(0));

        assert_eq!(store.put(key(3), stack("submit")), Some(key(0)));
        assert_eq!(store.len(), 3);
        assert!(!store.contains(&key(0)));
        assert!(store.contains(&key(1)));
        assert!(store.contains(&key(3)));
    }

    #[test]
    fn test_overwrite_same_key() {
        let store = CorrelationStore::new(2);
        store.put(key(1), stack("first"));
        store.put(key(2), stack("other"));
        assert_eq!(store.put(key(1), stack("second")), None);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&key(1)).unwrap().frames()[0].location.method, "second");

        // 上書きしても挿入順の位置は変わらない
        assert_eq!(store.put(key(3), stack("third")), Some(key(1)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = CorrelationStore::new(0);
        assert_eq!(store.capacity(), 1);
        store.put(key(1), stack("a"));
        store.put(key(2), stack("b"));
        assert_eq!(store.len(), 1);
        assert!(store.contains(&key(2)));
    }

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let store = Arc::new(CorrelationStore::new(100));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..200u64 {
                        store.put(key(t * 1000 + i), stack("submit"));
                        store.get(&key(t * 1000 + i / 2));
                        assert!(store.len() <= 100);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 100);
    }
}
