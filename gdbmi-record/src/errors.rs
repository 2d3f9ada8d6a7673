//! 解析エラー

use thiserror::Error;

/// 1行の解析に失敗したことを表すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// 既知のクラスマーカーで始まらない、または値文法に合わない行
    #[error("malformed record at byte {position}: {reason} (line: {line:?})")]
    MalformedRecord {
        line: String,
        position: usize,
        reason: &'static str,
    },
}

impl ParseError {
    /// 解析できなかった元の行を取得する
    pub fn line(&self) -> &str {
        match self {
            ParseError::MalformedRecord { line, .. } => line,
        }
    }
}
