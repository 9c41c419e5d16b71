//! 診断メッセージ

/// キャプチャ式の評価に失敗したときのメッセージ
pub fn capture_evaluation_failed(reason: &str) -> String {
    format!("Unable to evaluate capture expression: {}", reason)
}

/// インサート式の評価に失敗したときのメッセージ
pub fn insert_evaluation_failed(reason: &str) -> String {
    format!("Unable to evaluate insert expression: {}", reason)
}

/// キャプチャポイントがどのメソッドにもマッチしないときのメッセージ
pub fn no_matching_method(class_pattern: &str, method: &str) -> String {
    format!("Capture point {}.{} matches no method", class_pattern, method)
}

/// 論理トレースの区切り
pub const ASYNC_TRACE_SEPARATOR: &str = "--- async stack trace ---";
