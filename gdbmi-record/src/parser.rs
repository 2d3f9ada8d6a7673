//! GDB/MI の行パーサ
//!
//! 再帰下降で値文法を解析します。解析は入力を変更しない純粋な関数で、
//! 失敗した場合は [`ParseError::MalformedRecord`] を返します。

use crate::{Map, ParseError, Record, RecordKind, Token, Value};

/// 終端行
const TERMINATOR: &str = "(gdb)";

/// 解析中の位置
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

/// 位置と理由だけを持つ内部エラー（行全体は呼び出し元で付与する）
struct Fail {
    pos: usize,
    reason: &'static str,
}

type Parsed<T> = std::result::Result<T, Fail>;

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn fail<T>(&self, reason: &'static str) -> Parsed<T> {
        Err(Fail { pos: self.pos, reason })
    }

    fn expect(&mut self, byte: u8, reason: &'static str) -> Parsed<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            self.fail(reason)
        }
    }

    /// 値を1つ解析する
    fn value(&mut self) -> Parsed<Value> {
        match self.peek() {
            Some(b'"') => self.constant().map(Value::Const),
            Some(b'[') => self.list().map(Value::List),
            Some(b'{') => self.tuple().map(Value::Tuple),
            None => self.fail("expected value, found end of input"),
            Some(_) => self.fail("expected '\"', '[' or '{'"),
        }
    }

    /// クォートされた文字列を解析し、エスケープを解除する
    fn constant(&mut self) -> Parsed<String> {
        self.expect(b'"', "expected '\"'")?;
        let src: &'a str = self.src;
        let bytes = src.as_bytes();
        let mut out = Vec::new();

        loop {
            let Some(&b) = bytes.get(self.pos) else {
                return self.fail("unterminated string");
            };
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let Some(&esc) = bytes.get(self.pos) else {
                        return self.fail("unterminated escape sequence");
                    };
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'a' => out.push(0x07),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'v' => out.push(0x0b),
                        b'e' => out.push(0x1b),
                        b'0'..=b'7' => {
                            // 最大3桁の8進数
                            let mut code = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match bytes.get(self.pos) {
                                    Some(&d) if (b'0'..=b'7').contains(&d) => {
                                        code = code * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((code & 0xff) as u8);
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }

        Ok(String::from_utf8(out)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    /// `key=value` を1組解析する
    fn pair(&mut self) -> Parsed<(String, Value)> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'=') => break,
                Some(b',' | b'{' | b'}' | b'[' | b']' | b'"') | None => {
                    return self.fail("expected '=' after key");
                }
                Some(_) => self.pos += 1,
            }
        }
        if self.pos == start {
            return self.fail("empty key");
        }
        let key = self.src[start..self.pos].to_string();
        self.pos += 1;
        let value = self.value()?;
        Ok((key, value))
    }

    /// `{key=value,...}` を解析する
    fn tuple(&mut self) -> Parsed<Map> {
        self.expect(b'{', "expected '{'")?;
        let mut map = Map::new();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(map);
        }
        loop {
            let (key, value) = self.pair()?;
            map.insert(key, value);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(map);
                }
                None => return self.fail("unbalanced '{'"),
                Some(_) => return self.fail("expected ',' or '}'"),
            }
        }
    }

    /// `[value,...]` を解析する
    ///
    /// 旧形式の `[key=value,...]` の要素は、1要素の tuple として扱います。
    fn list(&mut self) -> Parsed<Vec<Value>> {
        self.expect(b'[', "expected '['")?;
        let mut items = Vec::new();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            let item = match self.peek() {
                Some(b'"' | b'[' | b'{') => self.value()?,
                _ => {
                    let (key, value) = self.pair()?;
                    let mut map = Map::new();
                    map.insert(key, value);
                    Value::Tuple(map)
                }
            };
            items.push(item);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                None => return self.fail("unbalanced '['"),
                Some(_) => return self.fail("expected ',' or ']'"),
            }
        }
    }

    /// `<what>[,<key>=<value>]*` を解析する
    fn payload(&mut self) -> Parsed<(String, Map)> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b',' {
                break;
            }
            self.pos += 1;
        }
        let what = self.src[start..self.pos].to_string();

        let mut args = Map::new();
        while !self.is_eof() {
            self.expect(b',', "expected ','")?;
            let (key, value) = self.pair()?;
            args.insert(key, value);
        }
        Ok((what, args))
    }
}

/// 内部エラーを行全体付きのエラーに変換する
fn malformed(line: &str, fail: Fail) -> ParseError {
    ParseError::MalformedRecord {
        line: line.to_string(),
        position: fail.pos,
        reason: fail.reason,
    }
}

/// 先頭で完全に1つの値を解析し、残りの入力と一緒に返す
fn parse_prefix<'a, T>(
    src: &'a str,
    f: impl FnOnce(&mut Cursor<'a>) -> Parsed<T>,
) -> Result<(T, &'a str), ParseError> {
    let mut cursor = Cursor::new(src);
    let value = f(&mut cursor).map_err(|e| malformed(src, e))?;
    Ok((value, cursor.rest()))
}

/// 値を1つ解析し、残りの入力を返す
///
/// # Examples
/// ```
/// use gdbmi_record::{parse_value, Value};
///
/// let (value, rest) = parse_value(r#""abc","123""#).unwrap();
/// assert_eq!(value, Value::from("abc"));
/// assert_eq!(rest, r#","123""#);
/// ```
pub fn parse_value(src: &str) -> Result<(Value, &str), ParseError> {
    parse_prefix(src, Cursor::value)
}

/// list を解析し、残りの入力を返す
///
/// # Examples
/// ```
/// use gdbmi_record::{parse_list, Value};
///
/// let (items, rest) = parse_list("[[],[]],123").unwrap();
/// assert_eq!(items, vec![Value::List(vec![]), Value::List(vec![])]);
/// assert_eq!(rest, ",123");
/// ```
pub fn parse_list(src: &str) -> Result<(Vec<Value>, &str), ParseError> {
    parse_prefix(src, Cursor::list)
}

/// tuple を解析し、残りの入力を返す
pub fn parse_tuple(src: &str) -> Result<(Map, &str), ParseError> {
    parse_prefix(src, Cursor::tuple)
}

/// プロトコルの1行を解析する
///
/// 先頭の10進数の並びはトークンとして取り除かれます（帯域外レコードには付きません）。
/// 行末の改行は呼び出し元で取り除いておく必要があります。
pub fn parse_line(line: &str) -> Result<(Option<Token>, Record), ParseError> {
    if line.trim_end() == TERMINATOR {
        return Ok((None, Record::terminator()));
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let token = if digits > 0 {
        let token = line[..digits].parse::<Token>().map_err(|_| {
            malformed(
                line,
                Fail {
                    pos: 0,
                    reason: "token out of range",
                },
            )
        })?;
        Some(token)
    } else {
        None
    };

    let rest = &line[digits..];
    let Some(kind) = rest.chars().next().and_then(RecordKind::from_marker) else {
        return Err(malformed(
            line,
            Fail {
                pos: digits,
                reason: "unknown record class marker",
            },
        ));
    };

    let body = &rest[1..];
    let mut cursor = Cursor::new(body);
    let offset = |fail: Fail| Fail {
        pos: fail.pos + digits + 1,
        reason: fail.reason,
    };

    let record = if kind.is_stream() {
        let text = cursor.constant().map_err(|e| malformed(line, offset(e)))?;
        if !cursor.is_eof() {
            let fail = Fail {
                pos: cursor.pos,
                reason: "trailing data after stream text",
            };
            return Err(malformed(line, offset(fail)));
        }
        Record::new(kind, text, Map::new())
    } else {
        let (what, args) = cursor.payload().map_err(|e| malformed(line, offset(e)))?;
        Record::new(kind, what, args)
    };

    Ok((token, record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_parse_const() {
        assert_eq!(parse_value(r#""""#).unwrap(), (c(""), ""));
        assert_eq!(parse_value(r#""abc""#).unwrap(), (c("abc"), ""));
        assert_eq!(parse_value(r#""abc\"1""#).unwrap(), (c("abc\"1"), ""));
        assert_eq!(parse_value(r#""a\nb\\c""#).unwrap(), (c("a\nb\\c"), ""));
    }

    #[test]
    fn test_parse_const_octal_utf8() {
        // "é" は UTF-8 で 0xc3 0xa9
        assert_eq!(parse_value(r#""\303\251""#).unwrap(), (c("é"), ""));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("[]").unwrap(), (vec![], ""));
        assert_eq!(parse_list("[],123").unwrap(), (vec![], ",123"));
        assert_eq!(
            parse_list(r#"["a","b","c"]"#).unwrap(),
            (vec![c("a"), c("b"), c("c")], "")
        );
        assert_eq!(parse_list("[[]],123").unwrap(), (vec![Value::List(vec![])], ",123"));
        assert_eq!(
            parse_list(r#"[[["a"]],["b"]],123"#).unwrap(),
            (
                vec![
                    Value::List(vec![Value::List(vec![c("a")])]),
                    Value::List(vec![c("b")]),
                ],
                ",123"
            )
        );
    }

    #[test]
    fn test_parse_list_siblings_do_not_share_state() {
        let (items, rest) = parse_list(r#"[[],[[]],[{a="1"}],[]]"#).unwrap();
        assert_eq!(rest, "");
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Value::List(vec![]));
        assert_eq!(items[1], Value::List(vec![Value::List(vec![])]));
        assert_eq!(items[2].as_list().unwrap()[0].get("a"), Some(&c("1")));
        assert_eq!(items[3], Value::List(vec![]));
    }

    #[test]
    fn test_parse_legacy_list() {
        let (items, _) = parse_list(r#"[frame={level="0"},frame={level="1"}]"#).unwrap();
        assert_eq!(items.len(), 2);
        let level = items[1].get("frame").and_then(|f| f.get("level"));
        assert_eq!(level, Some(&c("1")));
    }

    #[test]
    fn test_parse_tuple() {
        assert_eq!(parse_tuple("{}").unwrap(), (Map::new(), ""));
        let (map, rest) = parse_tuple(r#"{a="1",b={c=["x"]}},z"#).unwrap();
        assert_eq!(rest, ",z");
        assert_eq!(map.get("a"), Some(&c("1")));
        assert_eq!(
            map.get("b").and_then(|b| b.get("c")),
            Some(&Value::List(vec![c("x")]))
        );
    }

    #[test]
    fn test_parse_unbalanced() {
        assert!(parse_list("[").is_err());
        assert!(parse_list(r#"["a""#).is_err());
        assert!(parse_tuple(r#"{a="1""#).is_err());
        assert!(parse_value(r#""abc"#).is_err());
        assert!(parse_tuple(r#"{a="1"]"#).is_err());
    }

    #[test]
    fn test_parse_result_line() {
        let (token, record) =
            parse_line(r#"0002^done,bkpt={number="3",type="breakpoint"}"#).unwrap();
        assert_eq!(token, Some(Token::new(2)));
        assert_eq!(record.kind, RecordKind::Result);
        assert_eq!(record.what, "done");
        let bkpt = record.args.get("bkpt").unwrap();
        assert_eq!(bkpt.get("number"), Some(&c("3")));
        assert_eq!(bkpt.get("type"), Some(&c("breakpoint")));
    }

    #[test]
    fn test_parse_out_of_band_lines() {
        let (token, record) =
            parse_line(r#"*stopped,reason="breakpoint-hit",bkptno="1""#).unwrap();
        assert_eq!(token, None);
        assert_eq!(record.kind, RecordKind::ExecAsync);
        assert_eq!(record.what, "stopped");
        assert_eq!(record.arg_str("bkptno"), Some("1"));

        let (_, record) = parse_line(r#"=thread-group-added,id="i1""#).unwrap();
        assert_eq!(record.kind, RecordKind::NotifyAsync);

        let (_, record) = parse_line("+download").unwrap();
        assert_eq!(record.kind, RecordKind::StatusAsync);
        assert!(record.args.is_empty());

        let (_, record) = parse_line("^running").unwrap();
        assert_eq!(record.kind, RecordKind::Result);
        assert_eq!(record.what, "running");
    }

    #[test]
    fn test_parse_stream_lines() {
        let (_, record) = parse_line(r#"~"Breakpoint 1 at 0x1234\n""#).unwrap();
        assert_eq!(record.kind, RecordKind::ConsoleStream);
        assert_eq!(record.what, "Breakpoint 1 at 0x1234\n");

        let (_, record) = parse_line(r#"@"out""#).unwrap();
        assert_eq!(record.kind, RecordKind::TargetStream);

        let (_, record) = parse_line(r#"&"warning: \"x\"""#).unwrap();
        assert_eq!(record.kind, RecordKind::LogStream);
        assert_eq!(record.what, "warning: \"x\"");

        assert!(parse_line(r#"~"unterminated"#).is_err());
        assert!(parse_line(r#"~"a"b"#).is_err());
    }

    #[test]
    fn test_parse_terminator() {
        assert_eq!(parse_line("(gdb)").unwrap().1.kind, RecordKind::Terminator);
        assert_eq!(parse_line("(gdb) ").unwrap().1.kind, RecordKind::Terminator);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_line("9999^done,x="),
            Err(ParseError::MalformedRecord { .. })
        ));
        assert!(parse_line("hello").is_err());
        assert!(parse_line("0001").is_err());
        assert!(parse_line("^done,").is_err());
        assert!(parse_line("^done,novalue").is_err());
        assert!(parse_line(r#"^done,a="1"b="2""#).is_err());
    }

    #[test]
    fn test_malformed_error_keeps_line() {
        let err = parse_line("9999^done,x=").unwrap_err();
        assert_eq!(err.line(), "9999^done,x=");
    }
}
