//! キャプチャポイント定義のパース

use crate::CapturePointConfig;
use std::str::FromStr;
use thiserror::Error;

/// 定義文字列のパースエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("missing '=>' between capture and insert point in '{0}'")]
    MissingArrow(String),
    #[error("expected <Class>.<method> but found '{0}'")]
    MissingMethod(String),
}

/// `<Class>.<method>[:<expr>]` の片側をパースする
///
/// クラス名が空（`.run` など）でもかまいません。
fn parse_side(input: &str) -> Result<(String, String, String), DefinitionError> {
    let input = input.trim();
    let (target, expr) = match input.split_once(':') {
        Some((target, expr)) => (target.trim(), expr.trim()),
        None => (input, ""),
    };

    let (class, method) = target
        .rsplit_once('.')
        .ok_or_else(|| DefinitionError::MissingMethod(target.to_string()))?;
    let method = method.trim();
    if method.is_empty() || method.contains(char::is_whitespace) {
        return Err(DefinitionError::MissingMethod(target.to_string()));
    }

    Ok((class.trim().to_string(), method.to_string(), expr.to_string()))
}

/// キャプチャポイント定義をパースする
///
/// 形式: `<Class>.<method>[:<expr>] => [<Class>].<method>[:<expr>]`
///
/// # Examples
/// ```
/// use tsunagi_core::parse::parse_definition;
///
/// let point = parse_definition("app.Producer.submit:param_0 => .run:this.key").unwrap();
/// assert_eq!(point.capture_class_pattern, "app.Producer");
/// assert_eq!(point.capture_method_pattern, "submit");
/// assert_eq!(point.insert_class_pattern, "");
/// assert_eq!(point.insert_key_expr, "this.key");
/// ```
pub fn parse_definition(input: &str) -> Result<CapturePointConfig, DefinitionError> {
    let (capture, insert) = input
        .split_once("=>")
        .ok_or_else(|| DefinitionError::MissingArrow(input.trim().to_string()))?;

    let capture = parse_side(capture)?;
    let insert = parse_side(insert)?;

    Ok(CapturePointConfig {
        capture_class_pattern: capture.0,
        capture_method_pattern: capture.1,
        capture_key_expr: capture.2,
        insert_class_pattern: insert.0,
        insert_method_pattern: insert.1,
        insert_key_expr: insert.2,
        enabled: true,
    })
}

impl FromStr for CapturePointConfig {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_definition(s)
    }
}
