//! シミュレータコマンド

/// コマンドに書かれた値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSpec {
    /// `null`
    Null,
    /// 整数
    Int(i64),
    /// `"text"`（評価のたびに新しい文字列インスタンス）
    Text(String),
    /// `@name` で名前を付けたオブジェクト
    Named(String),
}

impl ValueSpec {
    /// 値の文字列をパースする
    pub fn parse(token: &str) -> Option<Self> {
        if token == "null" {
            return Some(ValueSpec::Null);
        }
        if let Some(name) = token.strip_prefix('@') {
            return (!name.is_empty()).then(|| ValueSpec::Named(name.to_string()));
        }
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Some(ValueSpec::Text(token[1..token.len() - 1].to_string()));
        }
        token.parse().ok().map(ValueSpec::Int)
    }
}

/// シミュレータコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// クラスをロード
    Class { name: String, methods: Vec<String> },
    /// 名前付きオブジェクトを作成
    New { name: String, type_name: String },
    /// オブジェクトのフィールドを設定
    Field {
        object: String,
        field: String,
        value: ValueSpec,
    },
    /// メソッドに入る（ブレークポイントのヒットを処理）
    Call {
        thread: u64,
        class: String,
        method: String,
        args: Vec<ValueSpec>,
    },
    /// 最も内側のフレームに変数を設定
    Set {
        thread: u64,
        name: String,
        value: ValueSpec,
    },
    /// メソッドから戻る
    Return(u64),
    /// バックトレース（非同期トレース付き）表示
    Backtrace(u64),
    /// キャプチャポイントを追加
    Add(String),
    /// キャプチャポイントを削除
    Remove(usize),
    /// キャプチャポイント一覧表示
    Points,
    /// キャプチャポイントを有効化
    Enable(usize),
    /// キャプチャポイントを無効化
    Disable(usize),
    /// コードをリロード
    Reload,
    /// 統計表示
    Stats,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

/// 空白で区切る。二重引用符の中の空白は区切りにしない
fn tokenize(input: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if quoted {
        return None;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Some(tokens)
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let parts = tokenize(input)?;
        let (name, args) = parts.split_first()?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match (name.as_str(), args.as_slice()) {
            ("class", [class, methods @ ..]) if !methods.is_empty() => Some(Command::Class {
                name: class.to_string(),
                methods: methods.iter().map(|m| m.to_string()).collect(),
            }),
            ("new", [name, type_name]) => Some(Command::New {
                name: name.to_string(),
                type_name: type_name.to_string(),
            }),
            ("field", [object, field, value]) => Some(Command::Field {
                object: object.strip_prefix('@')?.to_string(),
                field: field.to_string(),
                value: ValueSpec::parse(value)?,
            }),
            ("call", [thread, target, values @ ..]) => {
                let (class, method) = target.rsplit_once('.')?;
                Some(Command::Call {
                    thread: thread.parse().ok()?,
                    class: class.to_string(),
                    method: method.to_string(),
                    args: values
                        .iter()
                        .map(|v| ValueSpec::parse(v))
                        .collect::<Option<_>>()?,
                })
            }
            ("set", [thread, name, value]) => Some(Command::Set {
                thread: thread.parse().ok()?,
                name: name.to_string(),
                value: ValueSpec::parse(value)?,
            }),
            ("ret" | "return", [thread]) => Some(Command::Return(thread.parse().ok()?)),
            ("backtrace" | "bt", [thread]) => Some(Command::Backtrace(thread.parse().ok()?)),
            ("add", [_, ..]) => {
                let definition = input[name.len()..].trim();
                Some(Command::Add(definition.to_string()))
            }
            ("remove" | "rm", [index]) => Some(Command::Remove(index.parse().ok()?)),
            ("points" | "p", []) => Some(Command::Points),
            ("enable", [index]) => Some(Command::Enable(index.parse().ok()?)),
            ("disable", [index]) => Some(Command::Disable(index.parse().ok()?)),
            ("reload", []) => Some(Command::Reload),
            ("stats", []) => Some(Command::Stats),
            ("help" | "h" | "?", _) => Some(Command::Help),
            ("quit" | "q" | "exit", _) => Some(Command::Quit),
            _ => None,
        }
    }
}
