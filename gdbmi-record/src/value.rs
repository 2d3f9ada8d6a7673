//! GDB/MI の値（const / list / tuple）

use std::collections::BTreeMap;
use std::fmt;

/// キーから値へのマッピング（tuple とレコード引数）
pub type Map = BTreeMap<String, Value>;

/// GDB/MI の値
///
/// 値文法は再帰的で、ネストの深さに制限はありません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// ダブルクォートで囲まれた文字列（エスケープ解除済み）
    Const(String),
    /// `[...]` で囲まれた値の列
    List(Vec<Value>),
    /// `{...}` で囲まれた `key=value` の集合
    Tuple(Map),
}

impl Value {
    /// const の文字列を取得する
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Const(s) => Some(s),
            _ => None,
        }
    }

    /// list の要素を取得する
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// tuple のマッピングを取得する
    pub fn as_tuple(&self) -> Option<&Map> {
        match self {
            Value::Tuple(map) => Some(map),
            _ => None,
        }
    }

    /// tuple のフィールドを取得する
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_tuple()?.get(key)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Const(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Const(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(s) => write_quoted(f, s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Tuple(map) => {
                f.write_str("{")?;
                write_pairs(f, map)?;
                f.write_str("}")
            }
        }
    }
}

/// `key=value` の列をカンマ区切りで書き出す
pub(crate) fn write_pairs(f: &mut impl fmt::Write, map: &Map) -> fmt::Result {
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}={}", key, value)?;
    }
    Ok(())
}

/// 文字列をCスタイルでエスケープしてクォートする
pub(crate) fn write_quoted(f: &mut impl fmt::Write, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c if (c as u32) < 0x20 || c == '\u{7f}' => write!(f, "\\{:03o}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nested() {
        let mut frame = Map::new();
        frame.insert("func".to_string(), Value::from("main"));
        frame.insert("args".to_string(), Value::List(vec![]));
        let value = Value::List(vec![Value::Tuple(frame), Value::from("x")]);

        assert_eq!(value.to_string(), r#"[{args=[],func="main"},"x"]"#);
    }

    #[test]
    fn test_display_escapes() {
        let value = Value::from("say \"hi\"\n\x01");
        assert_eq!(value.to_string(), r#""say \"hi\"\n\001""#);
    }

    #[test]
    fn test_accessors() {
        let mut map = Map::new();
        map.insert("number".to_string(), Value::from("3"));
        let value = Value::Tuple(map);

        assert_eq!(value.get("number").and_then(Value::as_str), Some("3"));
        assert!(value.as_list().is_none());
        assert!(Value::from("a").get("number").is_none());
    }
}
