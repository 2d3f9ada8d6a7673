//! GDB/MI のトランスポート
//!
//! このクレートは、デバッガとのバイトストリームを扱う低レベル機能を提供します。
//! 非ブロッキングな読み込み、改行単位の切り出し、子プロセス・ソケット・
//! プロセス内チャネルの各トランスポート、疑似端末の作成などを行います。

pub mod channel;
pub mod framer;
pub mod process;
pub mod pty;
pub mod source;

pub use channel::{ChannelFeeder, ChannelSource, SharedSink};
pub use framer::LineFramer;
pub use process::{GdbCommand, GdbProcess, ProcessSource};
pub use pty::Pty;
pub use source::{ByteSource, Chunk, PollSink, PollSource, Transport, Wait};

/// トランスポートの結果型
pub type Result<T> = anyhow::Result<T>;
