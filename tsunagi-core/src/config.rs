//! 相関機能の設定

use crate::store::DEFAULT_STORE_CAPACITY;

/// 記録するスタックの最大の深さの既定値
pub const DEFAULT_MAX_STACK_LENGTH: usize = 50;

/// 相関機能の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// 記録するスタックの最大の深さ
    pub max_stack_length: usize,
    /// セッションごとのストア容量
    pub store_capacity: usize,
    /// フレームの変数も記録するか
    pub capture_variables: bool,
    /// 非同期スタックトレースを表示するか
    pub async_stacks_enabled: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_stack_length: DEFAULT_MAX_STACK_LENGTH,
            store_capacity: DEFAULT_STORE_CAPACITY,
            capture_variables: true,
            async_stacks_enabled: true,
        }
    }
}
