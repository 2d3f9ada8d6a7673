//! 改行単位の切り出し

/// 受信したバイト列から完全な行を取り出す
///
/// チャンクの境界と行の境界が一致することは仮定しません。
/// 末尾の不完全な行は次の [`push`](LineFramer::push) まで保持されます。
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// 改行が無いことを確認済みの先頭バイト数
    scanned: usize,
}

impl LineFramer {
    /// 新しいフレーマを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信したチャンクを追加する
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// 完全な行を1つ取り出す（改行と直前の `\r` は取り除く）
    pub fn next_line(&mut self) -> Option<String> {
        let offset = self.buf[self.scanned..].iter().position(|&b| b == b'\n');
        let Some(offset) = offset else {
            self.scanned = self.buf.len();
            return None;
        };
        let end = self.scanned + offset;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        self.scanned = 0;

        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// 現在取り出せる行をすべて返すイテレータ
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { framer: self }
    }

    /// まだ改行で終わっていないバイト列
    pub fn partial(&self) -> &[u8] {
        &self.buf
    }

    /// 取り出せる行が残っているか
    pub fn has_line(&self) -> bool {
        self.buf[self.scanned..].contains(&b'\n')
    }
}

/// [`LineFramer::lines`] のイテレータ
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut framer = LineFramer::new();
        framer.push(b"0001^running\n(gdb)\n");
        let lines: Vec<String> = framer.lines().collect();
        assert_eq!(lines, vec!["0001^running", "(gdb)"]);
        assert!(framer.partial().is_empty());
    }

    #[test]
    fn test_partial_line_is_kept() {
        let mut framer = LineFramer::new();
        framer.push(b"*stopped,rea");
        assert_eq!(framer.next_line(), None);
        assert_eq!(framer.partial(), b"*stopped,rea");

        framer.push(b"son=\"exited\"\n=thread");
        assert_eq!(framer.next_line().as_deref(), Some("*stopped,reason=\"exited\""));
        assert_eq!(framer.next_line(), None);

        framer.push(b"-group-added,id=\"i1\"\r\n");
        assert_eq!(framer.next_line().as_deref(), Some("=thread-group-added,id=\"i1\""));
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for b in "~\"é\"\n\n(gdb)\n".bytes() {
            framer.push(&[b]);
            lines.extend(framer.lines());
        }
        assert_eq!(lines, vec!["~\"é\"", "", "(gdb)"]);
    }

    #[test]
    fn test_lines_is_restartable() {
        let mut framer = LineFramer::new();
        framer.push(b"a\nb\nc");
        assert_eq!(framer.lines().next().as_deref(), Some("a"));
        assert!(framer.has_line());
        assert_eq!(framer.lines().collect::<Vec<_>>(), vec!["b"]);
        assert!(!framer.has_line());
    }
}
