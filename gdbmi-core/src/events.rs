//! 実行状態と状態変化の通知

use crate::{Breakpoint, ThreadGroup};
use gdbmi_record::{Record, Token};
use std::fmt;

/// 実行状態（exec-async レコードで最後に観測されたもの）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecState {
    Running,
    Stopped,
    Other(String),
}

impl From<&str> for ExecState {
    fn from(what: &str) -> Self {
        match what {
            "running" => ExecState::Running,
            "stopped" => ExecState::Stopped,
            other => ExecState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecState::Running => f.write_str("running"),
            ExecState::Stopped => f.write_str("stopped"),
            ExecState::Other(s) => f.write_str(s),
        }
    }
}

/// テーブルの更新内容
#[derive(Debug, Clone, Copy)]
pub enum StateChange<'a> {
    Breakpoint(&'a Breakpoint),
    ThreadGroup(&'a ThreadGroup),
}

/// テーブルが更新されるたびに呼ばれるコールバック
pub type StateCallback = Box<dyn FnMut(StateChange<'_>) + Send>;

/// 特定の種類のレコードを受け取るたびに呼ばれるコールバック
pub type RecordCallback = Box<dyn FnMut(Option<Token>, &Record) + Send>;
