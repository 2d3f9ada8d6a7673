//! コマンドの送信
//!
//! トークンの割り当てとコマンドテーブルへの登録は、受信ループとは別のスレッドからも
//! 行えるように排他制御されています。

use crate::command::{
    BreakpointHandler, Command, CommandInfo, ConsoleHandler, MiCommand, OnResult, ResultHandler,
};
use crate::errors::SessionError;
use crate::Result;
use gdbmi_record::Token;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// 送信側の共有状態
struct Outbox {
    next_token: AtomicU64,
    commands: Mutex<BTreeMap<Token, Command>>,
    sink: Mutex<Box<dyn Write + Send>>,
    closed: AtomicBool,
}

/// コマンドを送信するハンドル
///
/// クローンして他のスレッドに渡すことができます。
#[derive(Clone)]
pub struct CommandSender {
    outbox: Arc<Outbox>,
}

impl CommandSender {
    pub(crate) fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            outbox: Arc::new(Outbox {
                next_token: AtomicU64::new(0),
                commands: Mutex::new(BTreeMap::new()),
                sink: Mutex::new(sink),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// コマンドテーブルをロックする
    ///
    /// テーブルへの変更はマージのみなので、ポイズンされていてもそのまま使う。
    pub(crate) fn commands(&self) -> MutexGuard<'_, BTreeMap<Token, Command>> {
        self.outbox
            .commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// コマンドを送信し、割り当てたトークンを返す
    ///
    /// 書き込みが終わるのを待つだけで、結果は待ちません。
    pub fn send(
        &self,
        text: &str,
        on_result: Option<ResultHandler>,
        on_console: Option<ConsoleHandler>,
    ) -> Result<Token> {
        let on_result = on_result.map_or(OnResult::Nothing, OnResult::Handler);
        self.enqueue(text, on_result, on_console)
    }

    /// ブレークポイントを設定し、番号が確定したら停止時のハンドラを登録する
    ///
    /// 番号は停止イベントではなく `-break-insert` の結果で確定します。
    pub fn add_breakpoint(
        &self,
        location: &str,
        handler: Option<BreakpointHandler>,
    ) -> Result<Token> {
        self.enqueue(
            &format!("-break-insert {}", location),
            OnResult::InstallBreakpoint(handler),
            None,
        )
    }

    /// ブレークポイントを設定する（停止時のハンドラは登録しない）
    pub fn break_insert(&self, location: &str, on_result: Option<ResultHandler>) -> Result<Token> {
        self.send(&format!("-break-insert {}", location), on_result, None)
    }

    /// 実行を継続する
    pub fn exec_continue(&self, on_result: Option<ResultHandler>) -> Result<Token> {
        self.send("-exec-continue", on_result, None)
    }

    /// プログラムを実行する
    pub fn exec_run(&self, on_result: Option<ResultHandler>) -> Result<Token> {
        self.send("-exec-run", on_result, None)
    }

    /// 現在の関数から戻る（値を指定した場合はその値を返させる）
    pub fn exec_return(
        &self,
        value: Option<&str>,
        on_result: Option<ResultHandler>,
    ) -> Result<Token> {
        match value {
            Some(value) => self.send(&format!("-exec-return {}", value), on_result, None),
            None => self.send("-exec-return", on_result, None),
        }
    }

    /// 実行中のターゲットを中断する
    pub fn exec_interrupt(&self, on_result: Option<ResultHandler>) -> Result<Token> {
        self.send("-exec-interrupt", on_result, None)
    }

    /// 組み立てたMIコマンドを送信する
    pub fn execute(&self, command: &MiCommand, on_result: Option<ResultHandler>) -> Result<Token> {
        self.send(&command.to_string(), on_result, None)
    }

    /// トランスポートが閉じられたか
    pub fn is_closed(&self) -> bool {
        self.outbox.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        if !self.outbox.closed.swap(true, Ordering::AcqRel) {
            info!("Transport closed");
        }
    }

    /// 追跡中のコマンドを取得する
    pub fn command(&self, token: Token) -> Option<CommandInfo> {
        self.commands().get(&token).map(|cmd| CommandInfo {
            token,
            text: cmd.text.clone(),
            state: cmd.state,
        })
    }

    /// 追跡中のトークンの一覧
    pub fn tokens(&self) -> Vec<Token> {
        self.commands().keys().copied().collect()
    }

    /// コマンドの追跡をやめる
    pub fn forget(&self, token: Token) -> bool {
        self.commands().remove(&token).is_some()
    }

    /// コンソールハンドラだけを外す（コマンドは追跡したまま）
    pub(crate) fn clear_console(&self, token: Token) {
        if let Some(command) = self.commands().get_mut(&token) {
            command.on_console = None;
        }
    }

    fn enqueue(
        &self,
        text: &str,
        on_result: OnResult,
        on_console: Option<ConsoleHandler>,
    ) -> Result<Token> {
        if self.is_closed() {
            return Err(SessionError::TransportClosed.into());
        }

        let token = Token::new(self.outbox.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        // 結果が書き込みより先に届いても見つかるように、先に登録する
        self.commands()
            .insert(token, Command::new(text, on_result, on_console));

        let written = {
            let mut sink = self.outbox.sink.lock().unwrap_or_else(|e| e.into_inner());
            writeln!(sink, "{}{}", token, text).and_then(|_| sink.flush())
        };
        if let Err(e) = written {
            warn!("Failed to send [{}] {}: {}", token, text, e);
            self.commands().remove(&token);
            self.mark_closed();
            return Err(SessionError::TransportClosed.into());
        }

        info!("SENT[{}]: {}", token, text);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandState;
    use gdbmi_transport::SharedSink;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_writes_token_and_text() {
        let sink = SharedSink::new();
        let sender = CommandSender::new(Box::new(sink.clone()));

        let first = sender.send("-exec-run", None, None).unwrap();
        let second = sender.exec_return(Some("0"), None).unwrap();

        assert_eq!(first, Token::new(1));
        assert_eq!(second, Token::new(2));
        assert_eq!(sink.lines(), vec!["0001-exec-run", "0002-exec-return 0"]);

        let info = sender.command(first).unwrap();
        assert_eq!(info.text, "-exec-run");
        assert_eq!(info.state, CommandState::Pending);
    }

    #[test]
    fn test_commands_are_kept_until_forgotten() {
        let sender = CommandSender::new(Box::new(SharedSink::new()));
        let token = sender.add_breakpoint("main", None).unwrap();

        assert_eq!(sender.tokens(), vec![token]);
        assert!(sender.forget(token));
        assert!(!sender.forget(token));
        assert!(sender.tokens().is_empty());
    }

    #[test]
    fn test_clear_console_keeps_command() {
        let sender = CommandSender::new(Box::new(SharedSink::new()));
        let token = sender
            .send("info types", None, Some(Box::new(|_, _| {})))
            .unwrap();
        assert!(sender.commands().get(&token).unwrap().on_console.is_some());

        sender.clear_console(token);
        assert!(sender.commands().get(&token).unwrap().on_console.is_none());
        assert_eq!(sender.tokens(), vec![token]);
    }

    #[test]
    fn test_failed_write_closes_sender() {
        let sender = CommandSender::new(Box::new(BrokenPipe));
        let err = sender.exec_continue(None).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::TransportClosed)
        ));
        assert!(sender.is_closed());
        assert!(sender.tokens().is_empty());
        assert!(sender.exec_continue(None).is_err());
    }
}
