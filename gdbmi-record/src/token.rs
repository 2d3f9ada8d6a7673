//! 相関トークン

use std::fmt;
use std::str::FromStr;

/// コマンドとその結果レコードを結びつけるトークン
///
/// ワイヤ上ではゼロ埋め4桁の10進数として書き出されます（例: `0007`）。
/// 比較は数値で行うため、`7` と `0007` は同じトークンです。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// 数値からトークンを作成する
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// トークンの数値を取得する
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for Token {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Token)
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
