//! セッションのエラー

use gdbmi_record::{ParseError, Token};
use thiserror::Error;

/// セッションで発生するエラー
///
/// 受信ループ内で起きたものはログに出して破棄され、呼び出し元には伝播しません。
#[derive(Debug, Error)]
pub enum SessionError {
    /// 解析できない行（行は破棄され、セッションは継続する）
    #[error(transparent)]
    MalformedRecord(#[from] ParseError),

    /// 追跡中のコマンドが無いトークンへの結果
    #[error("result for unknown token {0:?}")]
    UnknownToken(Option<Token>),

    /// ハンドラが登録されていないブレークポイントで停止した
    #[error("breakpoint {0} hit but no handler is registered")]
    UnhandledBreakpointHit(u32),

    /// トランスポートが閉じられた
    #[error("transport closed")]
    TransportClosed,

    /// 追加されていないスレッドグループへの通知
    #[error("unknown thread group {0:?}")]
    UnknownThreadGroup(String),

    /// レコードに必要なフィールドが無い
    #[error("'{what}' record is missing field '{field}'")]
    MissingField { what: String, field: &'static str },

    /// フィールドの値が解釈できない
    #[error("invalid value {value:?} for field '{field}'")]
    InvalidField { field: &'static str, value: String },

    /// `start` が2回呼ばれた
    #[error("session already started")]
    AlreadyStarted,

    /// 待機が完了する前に中断された
    #[error("wait for {0:?} was stopped before a matching record arrived")]
    WaitAborted(Option<Token>),
}
