//! セッションのメインロジック
//!
//! 受信したバイト列を行に切り出し、レコードに解析し、種類ごとに振り分けます。
//! 振り分けは必ず受信した順に行われます。

use crate::breakpoint::{self, BreakpointTable};
use crate::command::{
    BreakpointHandler, CommandInfo, CommandState, ConsoleHandler, OnResult, ResultHandler,
};
use crate::errors::SessionError;
use crate::events::{ExecState, RecordCallback, StateCallback, StateChange};
use crate::sender::CommandSender;
use crate::thread_group::ThreadGroupTable;
use crate::{Breakpoint, Result, SessionConfig, ThreadGroup};
use gdbmi_record::{parse_line, Map, Record, RecordKind, Token, Value};
use gdbmi_transport::{ByteSource, Chunk, GdbCommand, GdbProcess, LineFramer, Pty, Transport, Wait};
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 振り分けの結果（false は「無視した」）
type Dispatched = std::result::Result<bool, SessionError>;

/// `wait_for` を外部から止めるハンドル
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// 実行中（または次回）の `wait_for` を false で終わらせる
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

/// 1回の読み込みの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 目的のレコードを受け取った
    Found,
    /// まだ届いていない
    Pending,
    /// トランスポートが閉じられた
    Closed,
}

/// `inferior_tty_set` で作成した端末
#[derive(Debug)]
pub struct InferiorTty {
    pub token: Token,
    pub pty: Pty,
}

/// デバッガとの1セッション
pub struct Session {
    /// 受信側
    source: Box<dyn ByteSource>,
    /// 受信バイト列の行分割
    framer: LineFramer,
    /// 読み込みバッファ
    read_buf: Vec<u8>,
    /// 送信側（他スレッドと共有）
    sender: CommandSender,
    config: SessionConfig,
    breakpoints: BreakpointTable,
    thread_groups: ThreadGroupTable,
    /// ブレークポイント番号から停止時ハンドラへのマッピング
    breakpoint_handlers: HashMap<u32, BreakpointHandler>,
    exec_state: Option<ExecState>,
    attached: bool,
    state_callbacks: Vec<StateCallback>,
    record_callbacks: Vec<(RecordKind, RecordCallback)>,
    stop: StopHandle,
}

impl Session {
    /// トランスポートからセッションを作成する
    pub fn new(transport: Transport, config: SessionConfig) -> Self {
        let read_buf = vec![0u8; config.read_chunk_size.max(1)];
        Self {
            source: transport.source,
            framer: LineFramer::new(),
            read_buf,
            sender: CommandSender::new(transport.sink),
            config,
            breakpoints: BreakpointTable::new(),
            thread_groups: ThreadGroupTable::new(),
            breakpoint_handlers: HashMap::new(),
            exec_state: None,
            attached: false,
            state_callbacks: Vec::new(),
            record_callbacks: Vec::new(),
            stop: StopHandle::default(),
        }
    }

    /// デバッガを起動してセッションを作成する
    pub fn spawn(command: &GdbCommand, config: SessionConfig) -> Result<(Self, GdbProcess)> {
        let (process, transport) = command.spawn()?;
        info!("session for debugger pid {}", process.pid());
        Ok((Self::new(transport, config), process))
    }

    /// 送信ハンドルを取得する（他スレッドから送信する場合に使う）
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// `wait_for` を止めるハンドルを取得する
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// 設定を取得する
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// コマンドを送信する
    pub fn send(
        &self,
        text: &str,
        on_result: Option<ResultHandler>,
        on_console: Option<ConsoleHandler>,
    ) -> Result<Token> {
        self.sender.send(text, on_result, on_console)
    }

    /// ブレークポイントを設定し、停止時のハンドラを登録する
    pub fn add_breakpoint(
        &self,
        location: &str,
        handler: Option<BreakpointHandler>,
    ) -> Result<Token> {
        self.sender.add_breakpoint(location, handler)
    }

    /// `main` にブレークポイントを設定してセッションを開始する
    pub fn start(&mut self) -> Result<Token> {
        if self.attached {
            return Err(SessionError::AlreadyStarted.into());
        }
        let token = self.sender.break_insert("main", None)?;
        self.attached = true;
        Ok(token)
    }

    /// `start` 済みか
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// 疑似端末を作成し、デバッグ対象の入出力をそこへ向ける
    pub fn inferior_tty_set(&self) -> Result<InferiorTty> {
        let pty = Pty::open()?;
        let token = self
            .sender
            .send(&format!("-inferior-tty-set {}", pty.slave_path()), None, None)?;
        Ok(InferiorTty { token, pty })
    }

    /// CLIコマンドを実行し、そのコンソール出力をまとめて返す
    ///
    /// 結果レコードが届くまでブロックします。
    pub fn console_exec(&mut self, query: &str) -> Result<String> {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let collected = Arc::clone(&lines);
        let token = self.sender.send(
            query,
            None,
            Some(Box::new(move |_, record: &Record| {
                collected
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(record.what.clone())
            })),
        )?;

        let finished = self.wait_for(Some(token));
        // 後から届くコンソール出力を回収されないバッファに溜めない
        self.sender.clear_console(token);
        if !finished {
            if self.sender.is_closed() {
                return Err(SessionError::TransportClosed.into());
            }
            return Err(SessionError::WaitAborted(Some(token)).into());
        }

        let text = lines.lock().unwrap_or_else(|e| e.into_inner()).concat();
        Ok(text)
    }

    /// テーブルの更新を購読する
    pub fn on_state_change(&mut self, callback: StateCallback) {
        self.state_callbacks.push(callback);
    }

    /// 特定の種類のレコードを購読する
    pub fn on_record(&mut self, kind: RecordKind, callback: RecordCallback) {
        self.record_callbacks.push((kind, callback));
    }

    /// 現在読み込めるレコードを順に返す
    ///
    /// 最初の待機だけ `wait` に従い、その後は待たずに読めるだけ読みます。
    /// 各レコードは返される前に振り分け済みです。
    pub fn read(&mut self, wait: Wait) -> ReadBatch<'_> {
        ReadBatch {
            session: self,
            wait,
            drained: false,
        }
    }

    /// 指定したトークンのレコードを受け取るまで待つ
    ///
    /// `None` の場合は任意のレコードを1つ受け取るまで待ちます。
    /// トランスポートが閉じられた場合と [`StopHandle`] で止められた場合は false を返します。
    pub fn wait_for(&mut self, target: Option<Token>) -> bool {
        self.wait_until(target, None)
    }

    /// 時間制限付きの `wait_for`
    pub fn wait_for_timeout(&mut self, target: Option<Token>, timeout: Duration) -> bool {
        self.wait_until(target, Some(Instant::now() + timeout))
    }

    /// 1回だけ読み込んで、指定したトークンのレコードが届いたか確認する
    ///
    /// `Wait::Immediate` を渡せばブロックしないので、外部のイベントループに組み込めます。
    pub fn poll_for(&mut self, target: Option<Token>, wait: Wait) -> WaitOutcome {
        let found = self
            .read(wait)
            .any(|(token, _)| target.is_none() || token == target);
        if found {
            WaitOutcome::Found
        } else if self.sender.is_closed() {
            WaitOutcome::Closed
        } else {
            WaitOutcome::Pending
        }
    }

    fn wait_until(&mut self, target: Option<Token>, deadline: Option<Instant>) -> bool {
        loop {
            if self.stop.take_request() {
                debug!("wait for {:?} stopped", target);
                return false;
            }
            let interval = self.config.poll_interval;
            let wait = match deadline {
                None => Wait::Timeout(interval),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    Wait::Timeout(interval.min(deadline - now))
                }
            };
            match self.poll_for(target, wait) {
                WaitOutcome::Found => return true,
                WaitOutcome::Closed => return false,
                WaitOutcome::Pending => {}
            }
        }
    }

    /// デバッガがまだ動いているか
    pub fn is_running(&mut self) -> bool {
        !self.sender.is_closed() && self.source.is_alive()
    }

    /// 追跡中のコマンドを取得する
    pub fn command(&self, token: Token) -> Option<CommandInfo> {
        self.sender.command(token)
    }

    /// コマンドの追跡をやめる
    pub fn forget(&self, token: Token) -> bool {
        self.sender.forget(token)
    }

    /// ブレークポイントを取得する
    pub fn breakpoint(&self, number: &str) -> Option<&Breakpoint> {
        self.breakpoints.get(number)
    }

    /// 全てのブレークポイントを取得する
    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.all()
    }

    /// スレッドグループを取得する
    pub fn thread_group(&self, id: &str) -> Option<&ThreadGroup> {
        self.thread_groups.get(id)
    }

    /// 全てのスレッドグループを取得する
    pub fn thread_groups(&self) -> impl Iterator<Item = &ThreadGroup> {
        self.thread_groups.all()
    }

    /// 最後に観測された実行状態
    pub fn exec_state(&self) -> Option<&ExecState> {
        self.exec_state.as_ref()
    }

    /// 受信側から読めるだけ読み込み、フレーマに渡す（読めたら true）
    fn fill(&mut self, wait: Wait) -> bool {
        if self.sender.is_closed() {
            return false;
        }
        match self.source.wait_readable(wait) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!("Failed to wait for debugger output: {}", e);
                self.sender.mark_closed();
                return false;
            }
        }
        match self.source.read_chunk(&mut self.read_buf) {
            Ok(Chunk::Data(n)) => {
                trace!("read {} bytes", n);
                self.framer.push(&self.read_buf[..n]);
                true
            }
            Ok(Chunk::Pending) => false,
            Ok(Chunk::Closed) => {
                self.sender.mark_closed();
                false
            }
            Err(e) => {
                warn!("Failed to read debugger output: {}", e);
                self.sender.mark_closed();
                false
            }
        }
    }

    /// 1行を解析して振り分ける（レコードにならなかった行は None）
    fn process_line(&mut self, line: &str) -> Option<(Option<Token>, Record)> {
        trace!("RAW: {}", line);
        if line.trim().is_empty() {
            return None;
        }
        let (token, record) = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{}", SessionError::from(e));
                return None;
            }
        };

        self.dispatch(token, &record);
        for (kind, callback) in self.record_callbacks.iter_mut() {
            if *kind == record.kind {
                callback(token, &record);
            }
        }
        Some((token, record))
    }

    /// レコードを種類ごとに振り分ける
    ///
    /// ここで起きたエラーはログに出すだけで、呼び出し元には返さない。
    fn dispatch(&mut self, token: Option<Token>, record: &Record) {
        let dispatched = match record.kind {
            RecordKind::Result => self.handle_result(token, record),
            RecordKind::ExecAsync => self.handle_exec(record),
            RecordKind::NotifyAsync => self.handle_notify(record),
            RecordKind::ConsoleStream => self.handle_console(record),
            RecordKind::Terminator => Ok(true),
            RecordKind::StatusAsync | RecordKind::TargetStream | RecordKind::LogStream => {
                debug!("{}: {:?}", record.kind, record.what);
                Ok(false)
            }
        };

        match dispatched {
            Ok(true) => {}
            Ok(false) => debug!("IGN: {:?} {}", token, record),
            Err(e) => warn!("dispatch error for {:?} {}: {}", token, record, e),
        }
    }

    fn handle_result(&mut self, token: Option<Token>, record: &Record) -> Dispatched {
        let Some(state) = CommandState::from_result_class(&record.what) else {
            return Ok(false);
        };
        let token = token.ok_or(SessionError::UnknownToken(None))?;

        let on_result = {
            let mut commands = self.sender.commands();
            let command = commands
                .get_mut(&token)
                .ok_or(SessionError::UnknownToken(Some(token)))?;
            command.state = state;
            mem::replace(&mut command.on_result, OnResult::Nothing)
        };

        let mut outcome = Ok(true);
        match on_result {
            OnResult::Nothing => {}
            OnResult::Handler(mut handler) => {
                handler(token, record);
                self.restore_result_handler(token, OnResult::Handler(handler));
            }
            OnResult::InstallBreakpoint(handler) => {
                outcome = self.install_breakpoint_handler(token, record, handler);
            }
        }

        if let Some(Value::Tuple(bkpt)) = record.get("bkpt") {
            self.merge_breakpoint(bkpt)?;
        }
        outcome
    }

    /// ハンドラの呼び出し中にロックを持たないよう、呼び出し後に戻す
    fn restore_result_handler(&self, token: Token, on_result: OnResult) {
        if let Some(command) = self.sender.commands().get_mut(&token) {
            if command.on_result.is_nothing() {
                command.on_result = on_result;
            }
        }
    }

    /// `-break-insert` の結果で確定した番号にハンドラを登録する
    fn install_breakpoint_handler(
        &mut self,
        token: Token,
        record: &Record,
        handler: Option<BreakpointHandler>,
    ) -> Dispatched {
        let number = record
            .get("bkpt")
            .and_then(|b| b.get("number"))
            .and_then(Value::as_str);
        let Some(number) = number else {
            warn!("breakpoint insert [{}] finished without a number: {}", token, record);
            return Ok(true);
        };
        let number = breakpoint::parse_number(number)?;
        info!("finishing add of breakpoint [{}] as number {}", token, number);
        match handler {
            Some(handler) => {
                self.breakpoint_handlers.insert(number, handler);
            }
            None => {
                self.breakpoint_handlers.remove(&number);
            }
        }
        Ok(true)
    }

    fn handle_exec(&mut self, record: &Record) -> Dispatched {
        self.exec_state = Some(ExecState::from(record.what.as_str()));
        if record.what != "stopped" {
            return Ok(true);
        }
        let Some(bkptno) = record.arg_str("bkptno") else {
            return Ok(true);
        };

        info!("hit BREAKPOINT {}", bkptno);
        let hit = breakpoint::parse_number(bkptno).and_then(|number| {
            let handler = self
                .breakpoint_handlers
                .get_mut(&number)
                .ok_or(SessionError::UnhandledBreakpointHit(number))?;
            handler(number, &record.args);
            Ok(())
        });

        // ハンドラが無くてもターゲットを止めたままにしない
        if self.config.resume_after_breakpoint && !self.sender.is_closed() {
            if let Err(e) = self.sender.exec_continue(None) {
                warn!("Failed to resume after breakpoint {}: {}", bkptno, e);
            }
        }
        hit.map(|_| true)
    }

    fn handle_notify(&mut self, record: &Record) -> Dispatched {
        let field = |key: &'static str| {
            record.arg_str(key).ok_or_else(|| SessionError::MissingField {
                what: record.what.clone(),
                field: key,
            })
        };

        let group = match record.what.as_str() {
            "thread-group-added" => self.thread_groups.add(field("id")?),
            "thread-group-started" => self.thread_groups.start(field("id")?, field("pid")?)?,
            "thread-created" => self.thread_groups.add_thread(field("group-id")?, field("id")?)?,
            "library-loaded" => {
                self.thread_groups
                    .load_library(field("thread-group")?, field("id")?, &record.args)?
            }
            "breakpoint-created" | "breakpoint-modified" => {
                let Some(Value::Tuple(bkpt)) = record.get("bkpt") else {
                    return Err(SessionError::MissingField {
                        what: record.what.clone(),
                        field: "bkpt",
                    });
                };
                self.merge_breakpoint(bkpt)?;
                return Ok(true);
            }
            _ => return Ok(false),
        };

        info!("thread group {:?}", group);
        for callback in self.state_callbacks.iter_mut() {
            callback(StateChange::ThreadGroup(group));
        }
        Ok(true)
    }

    fn handle_console(&mut self, record: &Record) -> Dispatched {
        // コンソール出力にはトークンが付かないため、最後に送ったコマンドに結びつける。
        // 複数のコマンドを同時に送ると誤った相手に届くことがある。
        let taken = {
            let mut commands = self.sender.commands();
            commands
                .iter_mut()
                .next_back()
                .map(|(token, command)| (*token, command.on_console.take()))
        };

        match taken {
            Some((token, Some(mut handler))) => {
                handler(token, record);
                if let Some(command) = self.sender.commands().get_mut(&token) {
                    command.on_console.get_or_insert(handler);
                }
            }
            Some((token, None)) => debug!("CONSOLE[{}] (no handler): {:?}", token, record.what),
            None => debug!("CONSOLE (no command): {:?}", record.what),
        }
        Ok(true)
    }

    fn merge_breakpoint(&mut self, info: &Map) -> std::result::Result<(), SessionError> {
        let bp = self.breakpoints.merge(info)?;
        info!("updated BREAKPOINT {:?}", bp);
        for callback in self.state_callbacks.iter_mut() {
            callback(StateChange::Breakpoint(bp));
        }
        Ok(())
    }
}

/// [`Session::read`] のイテレータ
pub struct ReadBatch<'s> {
    session: &'s mut Session,
    wait: Wait,
    drained: bool,
}

impl Iterator for ReadBatch<'_> {
    type Item = (Option<Token>, Record);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.session.framer.next_line() {
                match self.session.process_line(&line) {
                    Some(item) => return Some(item),
                    None => continue,
                }
            }
            if self.drained {
                return None;
            }
            if self.session.fill(self.wait) {
                self.wait = Wait::Immediate;
            } else {
                self.drained = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_exec_releases_collector() {
        let (transport, feeder, _sink) = Transport::in_memory();
        let mut session = Session::new(transport, SessionConfig::default());
        feeder.feed_line(r#"~"rax 0x0\n""#);
        feeder.feed_line("0001^done");

        let text = session.console_exec("info registers").unwrap();
        assert_eq!(text, "rax 0x0\n");

        let token = Token::new(1);
        assert!(session.sender.commands().get(&token).unwrap().on_console.is_none());
        assert_eq!(session.command(token).unwrap().state, CommandState::Done);

        // 後から届いた出力は追跡中のコマンドに残らない
        feeder.feed_line(r#"~"late\n""#);
        assert_eq!(session.read(Wait::Immediate).count(), 1);
        assert!(session.sender.commands().get(&token).unwrap().on_console.is_none());
    }
}
