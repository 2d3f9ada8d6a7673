//! GDB/MI セッションのコア機能
//!
//! このクレートは、デバッガとの1セッションを管理する中核ロジックを提供します。
//! トークン付きコマンドの送信、受信レコードの振り分け、ブレークポイントと
//! スレッドグループの状態管理、トークン単位の待機を統合します。

pub mod breakpoint;
pub mod command;
pub mod config;
pub mod errors;
pub mod events;
pub mod sender;
pub mod session;
pub mod thread_group;

pub use breakpoint::{Breakpoint, BreakpointTable};
pub use command::{
    BreakpointHandler, CommandInfo, CommandState, ConsoleHandler, MiCommand, ResultHandler,
};
pub use config::SessionConfig;
pub use errors::SessionError;
pub use events::{ExecState, RecordCallback, StateCallback, StateChange};
pub use sender::CommandSender;
pub use session::{InferiorTty, ReadBatch, Session, StopHandle, WaitOutcome};
pub use thread_group::{ThreadGroup, ThreadGroupTable};

// 他のクレートから使用するために再エクスポート
pub use gdbmi_record::{Map, Record, RecordKind, Token, Value};
pub use gdbmi_transport::{GdbCommand, GdbProcess, Transport, Wait};

/// セッションの結果型
pub type Result<T> = anyhow::Result<T>;
