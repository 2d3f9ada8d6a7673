//! 型付きレコード

use crate::value::{write_pairs, write_quoted};
use crate::{Map, Token, Value};
use std::fmt::{self, Write as _};

/// レコードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// 同期コマンドの結果（`^`）
    Result,
    /// 実行状態の非同期通知（`*`）
    ExecAsync,
    /// 進行状況の非同期通知（`+`）
    StatusAsync,
    /// その他の非同期通知（`=`）
    NotifyAsync,
    /// コンソール出力（`~`）
    ConsoleStream,
    /// ターゲット出力（`@`）
    TargetStream,
    /// ログ出力（`&`）
    LogStream,
    /// 応答の区切り（`(gdb)`）
    Terminator,
}

impl RecordKind {
    /// すべての種類
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Result,
        RecordKind::ExecAsync,
        RecordKind::StatusAsync,
        RecordKind::NotifyAsync,
        RecordKind::ConsoleStream,
        RecordKind::TargetStream,
        RecordKind::LogStream,
        RecordKind::Terminator,
    ];

    /// クラスマーカーから種類を判定する
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            '^' => Some(RecordKind::Result),
            '*' => Some(RecordKind::ExecAsync),
            '+' => Some(RecordKind::StatusAsync),
            '=' => Some(RecordKind::NotifyAsync),
            '~' => Some(RecordKind::ConsoleStream),
            '@' => Some(RecordKind::TargetStream),
            '&' => Some(RecordKind::LogStream),
            _ => None,
        }
    }

    /// クラスマーカーを取得する（終端行にはマーカーがない）
    pub fn marker(self) -> Option<char> {
        match self {
            RecordKind::Result => Some('^'),
            RecordKind::ExecAsync => Some('*'),
            RecordKind::StatusAsync => Some('+'),
            RecordKind::NotifyAsync => Some('='),
            RecordKind::ConsoleStream => Some('~'),
            RecordKind::TargetStream => Some('@'),
            RecordKind::LogStream => Some('&'),
            RecordKind::Terminator => None,
        }
    }

    /// ストリームレコード（`~` `@` `&`）かどうか
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            RecordKind::ConsoleStream | RecordKind::TargetStream | RecordKind::LogStream
        )
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Result => "result",
            RecordKind::ExecAsync => "exec-async",
            RecordKind::StatusAsync => "status-async",
            RecordKind::NotifyAsync => "notify-async",
            RecordKind::ConsoleStream => "console-stream",
            RecordKind::TargetStream => "target-stream",
            RecordKind::LogStream => "log-stream",
            RecordKind::Terminator => "terminator",
        };
        f.write_str(name)
    }
}

/// 解析済みのレコード
///
/// ストリームレコードでは `what` がエスケープ解除済みのテキスト全体になり、`args` は空です。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub what: String,
    pub args: Map,
}

impl Record {
    /// 新しいレコードを作成する
    pub fn new(kind: RecordKind, what: impl Into<String>, args: Map) -> Self {
        Self {
            kind,
            what: what.into(),
            args,
        }
    }

    /// 終端レコードを作成する
    pub fn terminator() -> Self {
        Self::new(RecordKind::Terminator, "", Map::new())
    }

    /// 引数を取得する
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// const の引数を文字列として取得する
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// ワイヤ形式の1行（改行なし）に直列化する
    pub fn to_line(&self, token: Option<Token>) -> String {
        let mut line = String::new();
        // String への書き込みは失敗しない
        let _ = self.write_line(&mut line, token);
        line
    }

    fn write_line(&self, out: &mut String, token: Option<Token>) -> fmt::Result {
        let Some(marker) = self.kind.marker() else {
            out.push_str("(gdb)");
            return Ok(());
        };
        if let Some(token) = token {
            write!(out, "{}", token)?;
        }
        out.push(marker);
        if self.kind.is_stream() {
            return write_quoted(out, &self.what);
        }
        out.push_str(&self.what);
        if !self.args.is_empty() {
            out.push(',');
            write_pairs(out, &self.args)?;
        }
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_line;

    fn map(pairs: &[(&str, Value)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_marker_table_is_consistent() {
        for kind in RecordKind::ALL {
            match kind.marker() {
                Some(m) => assert_eq!(RecordKind::from_marker(m), Some(kind)),
                None => assert_eq!(kind, RecordKind::Terminator),
            }
        }
    }

    #[test]
    fn test_to_line() {
        let record = Record::new(
            RecordKind::Result,
            "done",
            map(&[("bkpt", Value::Tuple(map(&[("number", Value::from("3"))])))]),
        );
        assert_eq!(record.to_line(Some(Token::new(2))), r#"0002^done,bkpt={number="3"}"#);
        assert_eq!(Record::terminator().to_line(None), "(gdb)");

        let console = Record::new(RecordKind::ConsoleStream, "a \"b\"\n", Map::new());
        assert_eq!(console.to_line(None), r#"~"a \"b\"\n""#);
    }

    #[test]
    fn test_reparse_constructed_records() {
        let frame = Value::Tuple(map(&[
            ("func", Value::from("orchardAppInit")),
            ("args", Value::List(vec![])),
            ("file", Value::from("C:\\src\\\"quoted\".c")),
        ]));
        let records = vec![
            (
                None,
                Record::new(
                    RecordKind::ExecAsync,
                    "stopped",
                    map(&[
                        ("frame", frame.clone()),
                        ("bkptno", Value::from("1")),
                        (
                            "stack",
                            Value::List(vec![
                                Value::List(vec![]),
                                Value::List(vec![Value::List(vec![frame])]),
                            ]),
                        ),
                    ]),
                ),
            ),
            (
                Some(Token::new(17)),
                Record::new(
                    RecordKind::Result,
                    "error",
                    map(&[("msg", Value::from("No symbol \"x\"."))]),
                ),
            ),
            (
                None,
                Record::new(RecordKind::LogStream, "line1\nline2\t\u{1}", Map::new()),
            ),
            (
                None,
                Record::new(
                    RecordKind::NotifyAsync,
                    "thread-group-added",
                    map(&[("id", Value::from("i1"))]),
                ),
            ),
            (None, Record::terminator()),
        ];

        for (token, record) in records {
            let line = record.to_line(token);
            let (parsed_token, parsed) = parse_line(&line).unwrap();
            assert_eq!(parsed_token, token, "token of {}", line);
            assert_eq!(parsed, record, "record of {}", line);
        }
    }
}
