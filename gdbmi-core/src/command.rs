//! 送信したコマンドの管理

use gdbmi_record::{Map, Record, Token};
use std::fmt;

/// 結果レコードを受け取るハンドラ
pub type ResultHandler = Box<dyn FnMut(Token, &Record) + Send>;

/// コンソール出力を受け取るハンドラ
pub type ConsoleHandler = Box<dyn FnMut(Token, &Record) + Send>;

/// ブレークポイントで停止したときに呼ばれるハンドラ（番号と停止レコードの引数）
pub type BreakpointHandler = Box<dyn FnMut(u32, &Map) + Send>;

/// コマンドの最後に観測された状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// 送信済みで結果待ち
    Pending,
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl CommandState {
    /// 結果レコードのクラスから状態を得る（結果クラスでなければ None）
    pub fn from_result_class(what: &str) -> Option<Self> {
        match what {
            "done" => Some(CommandState::Done),
            "running" => Some(CommandState::Running),
            "connected" => Some(CommandState::Connected),
            "error" => Some(CommandState::Error),
            "exit" => Some(CommandState::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandState::Pending => "pending",
            CommandState::Done => "done",
            CommandState::Running => "running",
            CommandState::Connected => "connected",
            CommandState::Error => "error",
            CommandState::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// 結果レコードを受け取ったときの動作
pub(crate) enum OnResult {
    Nothing,
    Handler(ResultHandler),
    /// 結果に含まれる番号でブレークポイントハンドラを登録する
    InstallBreakpoint(Option<BreakpointHandler>),
}

impl OnResult {
    pub(crate) fn is_nothing(&self) -> bool {
        matches!(self, OnResult::Nothing)
    }
}

/// 追跡中のコマンド
///
/// 自動的には削除されません。不要になったら `forget` で明示的に削除します。
pub(crate) struct Command {
    pub(crate) text: String,
    pub(crate) state: CommandState,
    pub(crate) on_result: OnResult,
    pub(crate) on_console: Option<ConsoleHandler>,
}

impl Command {
    pub(crate) fn new(text: &str, on_result: OnResult, on_console: Option<ConsoleHandler>) -> Self {
        Self {
            text: text.to_string(),
            state: CommandState::Pending,
            on_result,
            on_console,
        }
    }
}

/// 追跡中のコマンドのスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub token: Token,
    pub text: String,
    pub state: CommandState,
}

/// MIコマンドの組み立て
///
/// `-op opt1 opt2 -- param1 param2` の形にエンコードされます。
/// パラメータが1つも無い場合は ` --` 以降を出力しません。
///
/// # Examples
/// ```
/// use gdbmi_core::MiCommand;
///
/// let cmd = MiCommand::new("break-insert").option("-t").parameter("main");
/// assert_eq!(cmd.to_string(), "-break-insert -t -- main");
/// assert_eq!(MiCommand::new("exec-run").to_string(), "-exec-run");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiCommand {
    op: String,
    options: Vec<String>,
    parameters: Option<Vec<String>>,
}

impl MiCommand {
    /// 操作名（先頭の `-` は不要）を指定して作成する
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            options: Vec::new(),
            parameters: None,
        }
    }

    /// オプションを追加する
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// パラメータを追加する
    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameters
            .get_or_insert_with(Vec::new)
            .push(parameter.into());
        self
    }
}

impl fmt::Display for MiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{}", self.op)?;
        for option in &self.options {
            write!(f, " {}", option)?;
        }
        if let Some(parameters) = &self.parameters {
            write!(f, " -- {}", parameters.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(MiCommand::new("test").to_string(), "-test");
        assert_eq!(
            MiCommand::new("data-evaluate-expression")
                .option("--thread")
                .option("1")
                .to_string(),
            "-data-evaluate-expression --thread 1"
        );
        assert_eq!(
            MiCommand::new("exec-arguments")
                .parameter("a")
                .parameter("b")
                .to_string(),
            "-exec-arguments -- a b"
        );
    }

    #[test]
    fn test_result_classes() {
        assert_eq!(CommandState::from_result_class("done"), Some(CommandState::Done));
        assert_eq!(CommandState::from_result_class("running"), Some(CommandState::Running));
        assert_eq!(CommandState::from_result_class("error"), Some(CommandState::Error));
        assert_eq!(CommandState::from_result_class("stopped"), None);
    }
}
